use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise the control table.
///
/// Safe to call on every startup: `IF NOT EXISTS` makes it a no-op against an
/// existing database, so previously recorded rows are never touched.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS control (
            id             TEXT,
            status         TEXT NOT NULL,
            last_modified  TEXT NOT NULL,
            PRIMARY KEY (id, last_modified)
        );",
    )?;
    Ok(())
}

/// Open (creating if needed) the control database at `path` and ensure the
/// schema exists.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!(path = %path.display(), "opening control database");

    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_db(&conn)?;
    Ok(conn)
}
