//! Cross-process collection mutex.
//!
//! Writers hold an exclusive advisory lock (`fs2`) on `.collection.lock` for
//! the duration of one conditional write. The OS drops the lock when the
//! holder exits, so a crashed writer never wedges the collection.
//!
//! The holder records who it is in the file; waiters that time out report it.

use crate::error::{DocLockError, Result};
use crate::events::local_actor;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Name of the mutex file inside a collection directory.
pub(super) const MUTEX_FILE_NAME: &str = ".collection.lock";

/// Backoff between lock attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Holder details written into the mutex file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MutexHolder {
    owner: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl MutexHolder {
    fn current() -> Self {
        Self {
            owner: local_actor(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn describe(path: &Path) -> String {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str::<MutexHolder>(&content).ok())
            .map(|holder| {
                format!(
                    " (held by {} pid {} since {})",
                    holder.owner,
                    holder.pid,
                    holder.acquired_at.to_rfc3339()
                )
            })
            .unwrap_or_default()
    }
}

/// Guard for the collection mutex. Dropping it releases the lock.
#[derive(Debug)]
pub(super) struct CollectionMutex {
    _file: File,
    path: PathBuf,
}

impl CollectionMutex {
    /// Acquire the mutex in `dir`, waiting at most `timeout`.
    pub(super) fn acquire(dir: &Path, timeout: Duration) -> Result<Self> {
        let path = dir.join(MUTEX_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                DocLockError::StoreError(format!(
                    "failed to open collection mutex '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(DocLockError::StoreError(format!(
                            "collection mutex '{}' is held by another writer{}",
                            path.display(),
                            MutexHolder::describe(&path)
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(DocLockError::StoreError(format!(
                        "failed to lock collection mutex '{}': {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        // Diagnostics only; a failure here does not affect exclusion.
        if let Ok(json) = serde_json::to_string(&MutexHolder::current()) {
            let _ = file
                .set_len(0)
                .and_then(|()| file.seek(SeekFrom::Start(0)))
                .and_then(|_| file.write_all(json.as_bytes()));
        }

        Ok(Self { _file: file, path })
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
