use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Seek, Write};
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::error::{Result, SchedulerError};

/// Exclusive, cross-process lock on a file, held for the duration of one run.
///
/// The OS releases the lock when the holder's file handle closes, including
/// when the process dies, so there is nothing stale to clean up. The file
/// itself stays on disk and carries the last holder's pid for diagnostics.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

/// Live hold on a [`RunLock`]. Dropping it releases the lock.
pub type RunGuard<'a> = RwLockWriteGuard<'a, File>;

impl RunLock {
    /// Open (or create) the lock file without locking it.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            lock: RwLock::new(file),
        })
    }

    /// Take the lock without waiting, or fail with `AlreadyRunning`.
    pub fn try_acquire(&mut self) -> Result<RunGuard<'_>> {
        let mut guard = match self.lock.try_write() {
            Ok(guard) => guard,
            Err(e) if is_contended(&e) => {
                return Err(SchedulerError::AlreadyRunning {
                    lock: self.path.clone(),
                })
            }
            Err(e) => return Err(SchedulerError::Io(e)),
        };
        guard.set_len(0)?;
        guard.rewind()?;
        writeln!(*guard, "{}", std::process::id())?;
        debug!(lock = %self.path.display(), "run lock acquired");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `flock` reports `EWOULDBLOCK`; Windows reports `ERROR_LOCK_VIOLATION`.
fn is_contended(e: &io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock || (cfg!(windows) && e.raw_os_error() == Some(33))
}
