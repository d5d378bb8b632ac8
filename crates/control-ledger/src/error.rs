use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A row with the same `(id, last_modified)` already exists. The
    /// existing row is left as it was.
    #[error("duplicate key: status for {id} at {last_modified} already recorded")]
    DuplicateKey { id: String, last_modified: String },

    /// No status has ever been recorded for the entity.
    #[error("no status recorded for {id}")]
    NotFound { id: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Creating the database's parent directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
