//! Lock record, fencing token, and exception info.

use crate::error::{DocLockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Document field that holds the embedded lock record.
pub(crate) const LOCK_FIELD: &str = "lock";

/// Dotted path of the exception info inside the lock record.
pub(crate) const EXCEPTION_INFO_PATH: &str = "lock.exception_info";

/// Document field that counts administrative forced unlocks.
pub(crate) const UNLOCK_COUNTER_FIELD: &str = "unlock_counter";

/// Opaque fencing token minted for every acquired lease.
///
/// Release-side writes are conditioned on the token, so a holder whose lease
/// was reclaimed by another process can never overwrite the new holder's work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(Uuid);

impl LockKey {
    /// Mint a fresh, unique token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error details recorded on a document to hold it permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Error type name.
    #[serde(rename = "type")]
    pub kind: String,

    /// Error message.
    pub message: String,

    /// Chain of underlying causes, one per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl ExceptionInfo {
    /// Create exception info from its parts.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Attach a stack trace.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Capture an error, using its source chain as the stack trace.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            stack_trace: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }
}

/// Lock record embedded in a document while it is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Fencing token of the current holder.
    pub lock_key: LockKey,

    /// When the lease was acquired.
    pub lock_time: DateTime<Utc>,

    /// When the lease lapses unless exception info is attached.
    pub expire_time: DateTime<Utc>,

    /// Identity of the holder, if the caller supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Error details; presence makes the hold permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_info: Option<ExceptionInfo>,
}

impl Lock {
    /// Create a lock acquired at `lock_time` for `lease`, with a fresh key.
    ///
    /// Fails if the expiry falls outside the representable time range.
    pub fn new(lock_time: DateTime<Utc>, lease: Duration, actor: Option<String>) -> Result<Self> {
        let expire_time = lock_time.checked_add_signed(lease).ok_or_else(|| {
            DocLockError::UserError(format!(
                "lease of {} seconds is too long",
                lease.num_seconds()
            ))
        })?;
        Ok(Self {
            lock_key: LockKey::new(),
            lock_time,
            expire_time,
            actor,
            exception_info: None,
        })
    }

    /// Length of the lease window.
    pub fn lease_window(&self) -> Duration {
        self.expire_time.signed_duration_since(self.lock_time)
    }

    /// Holder name for diagnostics.
    pub fn holder(&self) -> &str {
        self.actor.as_deref().unwrap_or("unknown")
    }
}

/// Format a duration as a short human-readable string.
pub fn format_duration(duration: &Duration) -> String {
    let total_ms = duration.num_milliseconds().max(0);
    if total_ms < 1000 {
        if total_ms == 0 {
            return "0s".to_string();
        }
        return format!("{}ms", total_ms);
    }

    let seconds = total_ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
