use serde::{Deserialize, Serialize};

/// One row of the control table.
///
/// `(id, last_modified)` is unique; the same `id` appears once per recorded
/// status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub id: String,
    pub status: String,
    pub last_modified: String,
}

/// A status as seen in an entity's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: String,
    /// Text timestamp. Entries order lexicographically on this value.
    pub last_modified: String,
}

impl StatusEntry {
    pub fn new(status: impl Into<String>, last_modified: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            last_modified: last_modified.into(),
        }
    }
}

/// Statuses written by the scheduled workload.
///
/// The ledger stores free text, so any other label is accepted too; these
/// are the ones the refresh decision and run reporting rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Work on the entity has started.
    Processing,
    /// Work finished and its output is current.
    Completed,
    /// Work ended with an error; the next run retries.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(RunStatus::Processing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}
