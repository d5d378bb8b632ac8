//! `control-ledger` — append-only status history over the SQLite `control`
//! table.
//!
//! Each row records the status of a tracked entity at one instant, keyed by
//! `(id, last_modified)`. A status change is a new row; nothing is updated or
//! deleted, so the table doubles as the full transition history.

pub mod db;
pub mod error;
pub mod ledger;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::{ControlLedger, History, HistoryIter};
pub use types::{ControlRecord, RunStatus, StatusEntry};
