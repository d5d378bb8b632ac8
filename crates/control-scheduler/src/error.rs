use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The provided schedule definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Another run holds the run lock.
    #[error("Another run is in progress (lock held at {})", lock.display())]
    AlreadyRunning { lock: PathBuf },

    /// `crontab` could not be read or written.
    #[error("Crontab error: {0}")]
    Crontab(String),

    /// Layout or configuration problem surfaced by `control-core`.
    #[error(transparent)]
    Control(#[from] control_core::ControlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
