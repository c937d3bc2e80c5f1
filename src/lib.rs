//! Doclock: lease-based locking of documents in a shared document store.
//!
//! Independent processes that share nothing but a document store take turns
//! editing or deleting individual documents. A worker acquires a lease with
//! [`Repository::pick`] or [`Repository::wait`], edits the returned scope, and
//! releases it exactly once with `commit`, `abandon`, or `set_error_state`.
//! A lease that is never released lapses on its own; a document held with
//! exception info stays held until an operator clears it.
//!
//! ```no_run
//! use doclock::{AcquireOptions, DynamicEntity, MemoryStore, Repository};
//! use std::sync::Arc;
//!
//! # async fn demo() -> doclock::Result<()> {
//! let repository: Repository<DynamicEntity> = Repository::new(Arc::new(MemoryStore::new()));
//! repository.add(DynamicEntity::new("order-1").with_field("total", 10)).await?;
//!
//! if let Some(mut scope) = repository.pick("order-1", AcquireOptions::new()).await? {
//!     scope.entity_mut().fields.insert("total".into(), 12.into());
//!     scope.commit().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod lock;
pub mod repository;
pub mod store;

pub use error::{DocLockError, Result};
pub use lock::{ExceptionInfo, Lock, LockKey, LockState, LockedMode, ReleaseMode};
pub use repository::{
    AcquireOptions, DeleteScope, DynamicEntity, Entity, EntityScope, LockableEntity, Repository,
    WaitOptions,
};
pub use store::{DocumentStore, FileStore, Filter, MemoryStore, Update};
