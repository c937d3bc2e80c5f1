//! Lock state model for doclock.
//!
//! A document is locked by embedding a [`Lock`] record in the document itself,
//! under the `lock` field. Because the lock lives in the same document as the
//! entity, a single atomic conditional write can change both together.
//!
//! # Lock Record
//!
//! - `lock_key`: fencing token minted at acquire time
//! - `lock_time` / `expire_time`: the lease window
//! - `actor`: optional caller identity, for diagnostics
//! - `exception_info`: when present, the lease never expires on its own
//!
//! # Classification
//!
//! [`classify`] is the only place lock status is derived. Store-side filters,
//! query views, and the acquire protocol all go through it, so a document is
//! always in exactly one [`LockState`].

mod record;
mod state;


pub use record::{ExceptionInfo, Lock, LockKey, format_duration};
pub use state::{LockState, LockedMode, ReleaseMode, classify};
pub(crate) use record::{EXCEPTION_INFO_PATH, LOCK_FIELD, UNLOCK_COUNTER_FIELD};
