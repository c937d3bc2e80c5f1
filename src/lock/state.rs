//! Lock classification and the modes that select classes of locks.

use super::record::Lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived lock status of a document. Exactly one holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// No lock record.
    Unlocked,
    /// Held by a lease that has not lapsed.
    Active,
    /// Held by a lease that has lapsed; acquirable.
    Expired,
    /// Held permanently by recorded exception info.
    Exception,
}

impl LockState {
    /// States a new acquire may claim.
    pub const ACQUIRABLE: &'static [LockState] = &[LockState::Unlocked, LockState::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Unlocked => "unlocked",
            LockState::Active => "active",
            LockState::Expired => "expired",
            LockState::Exception => "exception",
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a lock record at `now`.
pub fn classify(lock: Option<&Lock>, now: DateTime<Utc>) -> LockState {
    match lock {
        None => LockState::Unlocked,
        Some(lock) if lock.exception_info.is_some() => LockState::Exception,
        Some(lock) if now < lock.expire_time => LockState::Active,
        Some(_) => LockState::Expired,
    }
}

/// Which locks an administrative release may clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMode {
    /// Only locks carrying exception info.
    ExceptionOnly,
    /// Only plain leases, active or expired.
    LockOnly,
    /// Any lock.
    #[default]
    Any,
}

impl ReleaseMode {
    /// States this mode clears.
    pub fn states(self) -> &'static [LockState] {
        match self {
            ReleaseMode::ExceptionOnly => &[LockState::Exception],
            ReleaseMode::LockOnly => &[LockState::Active, LockState::Expired],
            ReleaseMode::Any => &[LockState::Active, LockState::Expired, LockState::Exception],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseMode::ExceptionOnly => "exception_only",
            ReleaseMode::LockOnly => "lock_only",
            ReleaseMode::Any => "any",
        }
    }
}

impl fmt::Display for ReleaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which held documents a locked-view query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedMode {
    /// Active leases.
    Locked,
    /// Lapsed leases.
    Expired,
    /// Exception holds.
    Exception,
}

impl LockedMode {
    /// The single state this mode selects.
    pub fn state(self) -> LockState {
        match self {
            LockedMode::Locked => LockState::Active,
            LockedMode::Expired => LockState::Expired,
            LockedMode::Exception => LockState::Exception,
        }
    }
}
