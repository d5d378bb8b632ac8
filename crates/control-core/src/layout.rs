//! On-disk layout of a provisioned environment: the control database, the
//! per-run log directory and the workload's data directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::{debug, info};

use crate::config::PathsConfig;
use crate::error::Result;

/// `strftime` pattern for run log names, e.g. `202401010000.log`.
pub const LOG_FILE_FORMAT: &str = "%Y%m%d%H%M";
/// Lock file held for the duration of one workload run.
pub const LOCK_FILE: &str = ".control.lock";

/// Resolved paths. Relative config entries are joined onto `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    database: PathBuf,
    logs_dir: PathBuf,
    data_dir: PathBuf,
}

impl Layout {
    pub fn from_config(paths: &PathsConfig) -> Self {
        let root = PathBuf::from(&paths.root);
        Self {
            database: root.join(&paths.database),
            logs_dir: root.join(&paths.logs_dir),
            data_dir: root.join(&paths.data_dir),
            root,
        }
    }

    /// Default layout rooted at `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        Self::from_config(&PathsConfig {
            root: root.as_ref().to_string_lossy().into_owned(),
            ..PathsConfig::default()
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn lock_file(&self) -> PathBuf {
        self.logs_dir.join(LOCK_FILE)
    }

    /// Create `logs/` and `data/` (and the database's parent) if absent.
    ///
    /// Equivalent to `mkdir -p`: existing directories and their contents are
    /// left untouched, so calling this repeatedly is harmless.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.logs_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)?;
            debug!(path = %dir.display(), "directory ready");
        }
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(
            logs = %self.logs_dir.display(),
            data = %self.data_dir.display(),
            "directories ensured"
        );
        Ok(())
    }

    /// Log file for a run started at `at`, named in `at`'s own timezone.
    pub fn log_file_for<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.logs_dir
            .join(format!("{}.log", at.format(LOG_FILE_FORMAT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn relative_paths_resolve_against_root() {
        let layout = Layout::under("/srv/control");
        assert_eq!(layout.database(), Path::new("/srv/control/control.db"));
        assert_eq!(layout.logs_dir(), Path::new("/srv/control/logs"));
        assert_eq!(layout.data_dir(), Path::new("/srv/control/data"));
        assert_eq!(layout.lock_file(), Path::new("/srv/control/logs/.control.lock"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let layout = Layout::from_config(&PathsConfig {
            root: "/srv/control".to_string(),
            logs_dir: "/var/log/control".to_string(),
            ..PathsConfig::default()
        });
        assert_eq!(layout.logs_dir(), Path::new("/var/log/control"));
    }

    #[test]
    fn log_file_uses_minute_resolution_timestamp() {
        let layout = Layout::under("/srv/control");
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 59).unwrap();
        assert_eq!(
            layout.log_file_for(&at),
            Path::new("/srv/control/logs/202401020000.log")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent_and_keeps_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = Layout::under(tmp.path());

        layout.ensure_dirs().expect("first run");
        let kept = layout.logs_dir().join("202401010000.log");
        std::fs::write(&kept, "previous run output").expect("write log");
        std::fs::write(layout.data_dir().join("hospitals.csv"), "a,b").expect("write data");

        layout.ensure_dirs().expect("second run");

        assert_eq!(
            std::fs::read_to_string(&kept).expect("read log"),
            "previous run output"
        );
        assert!(layout.data_dir().join("hospitals.csv").exists());
        let dirs: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read root")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains(&"logs".to_string()));
        assert!(dirs.contains(&"data".to_string()));
    }
}
