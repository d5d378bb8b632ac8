use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown timezone: {0}")]
    Timezone(String),
}

impl ControlError {
    /// Short error code string, printed next to CLI failures.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Config(_) => "CONFIG_ERROR",
            ControlError::Io(_) => "IO_ERROR",
            ControlError::Timezone(_) => "TIMEZONE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
