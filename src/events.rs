//! Lock protocol events.
//!
//! Every acquire and release performed by a repository is reported to the
//! [`LockObserver`] injected into it. There is no process-wide hook: two
//! repositories in the same process can report to different observers.
//!
//! # Event Format
//!
//! Each event carries:
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (pick, commit, abandon, release, ...)
//! - `entity_id`: the document concerned
//! - `actor`: the lease holder, when known
//! - `details`: freeform object with action-specific details
//!
//! [`NdjsonObserver`] appends events as one JSON object per line, which makes
//! the file an audit trail of who held what and when.

use crate::error::{DocLockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Actions that can be reported as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    /// Lease acquired for update
    Pick,
    /// Lease acquired for delete
    PickForDelete,
    /// Changes persisted and lease released
    Commit,
    /// Document deleted and lease released
    Delete,
    /// Lease released without changes
    Abandon,
    /// Exception info recorded, hold made permanent
    ErrorState,
    /// Lock cleared administratively
    Release,
    /// Unreleased scope abandoned on drop
    DropAbandon,
    /// Drop abandon failed, exception info recorded instead
    DropAbandonFailed,
}

impl std::fmt::Display for LockAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LockAction::Pick => "pick",
            LockAction::PickForDelete => "pick_for_delete",
            LockAction::Commit => "commit",
            LockAction::Delete => "delete",
            LockAction::Abandon => "abandon",
            LockAction::ErrorState => "error_state",
            LockAction::Release => "release",
            LockAction::DropAbandon => "drop_abandon",
            LockAction::DropAbandonFailed => "drop_abandon_failed",
        };
        f.write_str(name)
    }
}

/// A lock protocol event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// What happened.
    pub action: LockAction,

    /// Id of the document concerned.
    pub entity_id: String,

    /// Lease holder, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl LockEvent {
    pub fn new(action: LockAction, entity_id: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            entity_id: entity_id.into(),
            actor: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_actor(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            DocLockError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Receives lock protocol events.
///
/// Observers are called inline; they must not block for long and must not fail
/// the protocol, so the method returns nothing.
pub trait LockObserver: Send + Sync {
    fn on_event(&self, event: &LockEvent);
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LockObserver for NoopObserver {
    fn on_event(&self, _event: &LockEvent) {}
}

/// Observer that logs events at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LockObserver for TracingObserver {
    fn on_event(&self, event: &LockEvent) {
        tracing::debug!(
            action = %event.action,
            entity_id = %event.entity_id,
            actor = event.actor.as_deref().unwrap_or("-"),
            details = %event.details,
            "lock event"
        );
    }
}

/// Observer that appends events to an NDJSON file.
#[derive(Debug)]
pub struct NdjsonObserver {
    path: PathBuf,
    // Keeps lines from concurrent scopes in one process from interleaving.
    write_lock: Mutex<()>,
}

impl NdjsonObserver {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event to the log file, creating it if needed.
    pub fn append(&self, event: &LockEvent) -> Result<()> {
        let json_line = event.to_ndjson_line()?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                DocLockError::UserError(format!(
                    "failed to create events directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                DocLockError::UserError(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            DocLockError::UserError(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Read every event in the log file.
    pub fn read_all(&self) -> Result<Vec<LockEvent>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DocLockError::UserError(format!(
                    "failed to read events file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    DocLockError::UserError(format!("failed to parse event line: {}", e))
                })
            })
            .collect()
    }
}

impl LockObserver for NdjsonObserver {
    fn on_event(&self, event: &LockEvent) {
        if let Err(e) = self.append(event) {
            tracing::warn!(error = %e, "failed to record lock event");
        }
    }
}

/// Identity string for this process' user (`user@HOST`).
pub fn local_actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
