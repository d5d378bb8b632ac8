use std::path::PathBuf;

use control_ledger::RunStatus;
use serde::{Deserialize, Serialize};

/// Defines when and how often the workload should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run every day at the given hour and minute, in the engine's timezone.
    Daily { hour: u8, minute: u8 },

    /// Run repeatedly with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Run according to a cron expression (five or seven fields).
    Cron { expression: String },
}

impl Schedule {
    /// Daily at midnight.
    pub const MIDNIGHT: Schedule = Schedule::Daily { hour: 0, minute: 0 };

    /// Build a schedule from a crontab-style expression.
    ///
    /// Plain `M H * * *` entries become [`Schedule::Daily`]; everything else is
    /// kept as [`Schedule::Cron`]. The expression is not validated here;
    /// [`crate::schedule::compute_next_run`] rejects bad ones.
    pub fn from_expression(expression: &str) -> Self {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if let [minute, hour, "*", "*", "*"] = fields.as_slice() {
            if let (Ok(minute), Ok(hour)) = (minute.parse::<u8>(), hour.parse::<u8>()) {
                if hour < 24 && minute < 60 {
                    return Schedule::Daily { hour, minute };
                }
            }
        }
        Schedule::Cron {
            expression: expression.trim().to_string(),
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Schedule::Interval { every_secs } => write!(f, "every {every_secs}s"),
            Schedule::Cron { expression } => write!(f, "cron '{expression}'"),
        }
    }
}

/// Result of one workload run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// UUIDv7 — time-sortable, so outcomes line up with log file order.
    pub run_id: String,
    /// Workload label.
    pub job: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// RFC 3339 end time.
    pub finished_at: String,
    /// Process exit code; `None` if it never started or died from a signal.
    pub exit_code: Option<i32>,
    /// File that received the run's combined stdout/stderr.
    pub log_path: PathBuf,
    /// `completed` on exit code 0, `failed` otherwise.
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_expression_is_daily() {
        assert_eq!(Schedule::from_expression("0 0 * * *"), Schedule::MIDNIGHT);
        assert_eq!(
            Schedule::from_expression("30 6 * * *"),
            Schedule::Daily { hour: 6, minute: 30 }
        );
    }

    #[test]
    fn other_expressions_stay_cron() {
        assert_eq!(
            Schedule::from_expression("0 0 * * 1"),
            Schedule::Cron {
                expression: "0 0 * * 1".to_string()
            }
        );
        assert!(matches!(
            Schedule::from_expression("0 25 * * *"),
            Schedule::Cron { .. }
        ));
    }

    #[test]
    fn schedule_serializes_with_kind_tag() {
        let json = serde_json::to_value(Schedule::MIDNIGHT).expect("json");
        assert_eq!(
            json,
            serde_json::json!({ "kind": "daily", "hour": 0, "minute": 0 })
        );
    }
}
