use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::db;
use crate::error::{LedgerError, Result};
use crate::types::{ControlRecord, RunStatus, StatusEntry};

/// Rows fetched per query while iterating a [`History`].
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Append-only store of per-entity status history.
///
/// All access to the control table goes through this type. Rows are only
/// ever inserted: a status change is a new `(id, last_modified)` row, never
/// an update of an old one.
pub struct ControlLedger {
    db: Mutex<Connection>,
}

impl ControlLedger {
    /// Wrap an already-open connection, creating the table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: Mutex::new(db::open(path)?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial SQLite state behind.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a status for `id` at `last_modified`.
    ///
    /// Fails with [`LedgerError::DuplicateKey`] if that instant is already
    /// recorded for `id`; the stored row is not overwritten.
    #[instrument(skip(self))]
    pub fn record_status(&self, id: &str, status: &str, last_modified: &str) -> Result<()> {
        let db = self.conn();
        match db.execute(
            "INSERT INTO control (id, status, last_modified) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, status, last_modified],
        ) {
            Ok(_) => {
                info!("status recorded");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                warn!("duplicate status rejected");
                Err(LedgerError::DuplicateKey {
                    id: id.to_string(),
                    last_modified: last_modified.to_string(),
                })
            }
            Err(e) => Err(LedgerError::Database(e)),
        }
    }

    /// The most recent entry for `id`, or `None` if nothing was recorded.
    #[instrument(skip(self))]
    pub fn latest(&self, id: &str) -> Result<Option<StatusEntry>> {
        let db = self.conn();
        let entry = db
            .query_row(
                "SELECT status, last_modified FROM control
                 WHERE id = ?1
                 ORDER BY last_modified DESC
                 LIMIT 1",
                rusqlite::params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Status with the greatest `last_modified` for `id`.
    pub fn latest_status(&self, id: &str) -> Result<String> {
        self.latest(id)?
            .map(|entry| entry.status)
            .ok_or_else(|| LedgerError::NotFound { id: id.to_string() })
    }

    /// Lazy, restartable view over `id`'s history, oldest first.
    ///
    /// Nothing is read until the returned value is iterated, and each
    /// iteration starts again from the first entry.
    pub fn history(&self, id: &str) -> History<'_> {
        History {
            ledger: self,
            id: id.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Status recorded for `id` at exactly `last_modified`.
    #[instrument(skip(self))]
    pub fn status_at(&self, id: &str, last_modified: &str) -> Result<Option<String>> {
        let db = self.conn();
        let status = db
            .query_row(
                "SELECT status FROM control WHERE id = ?1 AND last_modified = ?2",
                rusqlite::params![id, last_modified],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    /// Most recent `last_modified` at which `id` was recorded with `status`.
    #[instrument(skip(self))]
    pub fn latest_with_status(&self, id: &str, status: &str) -> Result<Option<String>> {
        let db = self.conn();
        let last: Option<String> = db.query_row(
            "SELECT MAX(last_modified) FROM control WHERE id = ?1 AND status = ?2",
            rusqlite::params![id, status],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    /// Whether a source version stamped `candidate` still has to be processed.
    ///
    /// True when `id` has never completed, or its newest completion is older
    /// than `candidate`.
    pub fn needs_refresh(&self, id: &str, candidate: &str) -> Result<bool> {
        let completed = self.latest_with_status(id, RunStatus::Completed.as_str())?;
        let refresh = match completed.as_deref() {
            None => true,
            Some(last) => last < candidate,
        };
        debug!(id, candidate, ?completed, refresh, "refresh decision");
        Ok(refresh)
    }

    /// The latest record of every tracked entity, ordered by id.
    #[instrument(skip(self))]
    pub fn tracked_ids(&self) -> Result<Vec<ControlRecord>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT c.id, c.status, c.last_modified
             FROM control c
             JOIN (SELECT id, MAX(last_modified) AS last_modified
                   FROM control GROUP BY id) newest
               ON c.id = newest.id AND c.last_modified = newest.last_modified
             ORDER BY c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ControlRecord {
                id: row.get(0)?,
                status: row.get(1)?,
                last_modified: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(LedgerError::from)
    }

    /// One page of `id`'s history strictly after `after`.
    fn history_page(
        &self,
        id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StatusEntry>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(
            "SELECT status, last_modified FROM control
             WHERE id = ?1 AND (?2 IS NULL OR last_modified > ?2)
             ORDER BY last_modified ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![id, after, limit as i64], row_to_entry)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(LedgerError::from)
    }
}

/// History of one entity. Iterate it (by reference) as often as needed.
#[derive(Clone)]
pub struct History<'a> {
    ledger: &'a ControlLedger,
    id: String,
    page_size: usize,
}

impl<'a> History<'a> {
    /// Fetch `page_size` rows per query instead of the default.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Start a fresh pass from the oldest entry.
    pub fn iter(&self) -> HistoryIter<'a> {
        HistoryIter {
            ledger: self.ledger,
            id: self.id.clone(),
            page_size: self.page_size,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Read the whole history into memory.
    pub fn to_vec(&self) -> Result<Vec<StatusEntry>> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &History<'a> {
    type Item = Result<StatusEntry>;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Keyset-paginated cursor over one entity's history.
pub struct HistoryIter<'a> {
    ledger: &'a ControlLedger,
    id: String,
    page_size: usize,
    cursor: Option<String>,
    buffer: VecDeque<StatusEntry>,
    exhausted: bool,
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<StatusEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .ledger
                .history_page(&self.id, self.cursor.as_deref(), self.page_size)
            {
                Ok(page) => {
                    self.exhausted = page.len() < self.page_size;
                    if let Some(last) = page.last() {
                        self.cursor = Some(last.last_modified.clone());
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusEntry> {
    Ok(StatusEntry {
        status: row.get(0)?,
        last_modified: row.get(1)?,
    })
}
