//! Scopes handed out by a successful acquire, and their release operations.

use super::{Entity, LockableEntity, decode, encode, short_type_name};
use crate::error::{DocLockError, Result};
use crate::events::{LockAction, LockEvent, LockObserver};
use crate::lock::{EXCEPTION_INFO_PATH, ExceptionInfo, LOCK_FIELD, Lock, LockKey};
use crate::store::{DocumentStore, Filter, Update};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Abandons scheduled for scopes dropped without release.
#[derive(Debug, Clone, Default)]
pub struct PendingReleases {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PendingReleases {
    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poison| poison.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Number of abandons still running.
    pub fn len(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|poison| poison.into_inner());
        tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked abandon, including ones scheduled while waiting.
    pub async fn drain(&self) {
        loop {
            let batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|poison| poison.into_inner());
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return;
            }
            for task in batch {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "dropped-scope abandon task failed");
                }
            }
        }
    }
}

/// Collaborators a scope needs to release itself.
pub(super) struct ScopeContext {
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) observer: Arc<dyn LockObserver>,
    pub(super) pending: PendingReleases,
}

/// State and release logic shared by both scope kinds.
pub(super) struct ScopeCore<T> {
    record: LockableEntity<T>,
    original_id: String,
    lock: Lock,
    released: bool,
    ctx: ScopeContext,
}

impl<T: Entity> ScopeCore<T> {
    pub(super) fn new(mut record: LockableEntity<T>, lock: Lock, ctx: ScopeContext) -> Self {
        record.lock = Some(lock.clone());
        Self {
            original_id: record.entity.id().to_string(),
            record,
            lock,
            released: false,
            ctx,
        }
    }

    fn key_filter(&self) -> Filter {
        key_filter(&self.original_id, self.lock.lock_key)
    }

    fn elapsed(&self) -> Duration {
        Utc::now().signed_duration_since(self.lock.lock_time)
    }

    fn expired_error(&self) -> DocLockError {
        DocLockError::LockExpired {
            entity_type: short_type_name::<T>(),
            elapsed: self.elapsed(),
            lease: self.lock.lease_window(),
        }
    }

    fn check_released(&self) -> Result<()> {
        if self.released {
            return Err(DocLockError::LockAlreadyReleased {
                id: self.original_id.clone(),
            });
        }
        Ok(())
    }

    fn check_validity(&self) -> Result<()> {
        if self.elapsed() > self.lock.lease_window() {
            return Err(self.expired_error());
        }
        Ok(())
    }

    fn emit(&self, action: LockAction, details: serde_json::Value) {
        let event = LockEvent::new(action, &self.original_id)
            .with_actor(self.lock.actor.as_deref())
            .with_details(details);
        self.ctx.observer.on_event(&event);
    }

    async fn commit_update(&mut self, updated: T) -> Result<T> {
        self.check_released()?;
        if updated.id() != self.original_id {
            return Err(DocLockError::UnlockDifferentEntity {
                expected: self.original_id.clone(),
                actual: updated.id().to_string(),
            });
        }
        self.check_validity()?;

        let committed = LockableEntity {
            entity: updated,
            lock: None,
            unlock_counter: self.record.unlock_counter,
        };
        let document = encode(&committed)?;

        self.released = true;
        let replaced = self
            .ctx
            .store
            .conditional_replace(&self.key_filter(), document)
            .await?;
        if replaced.is_none() {
            return Err(self.expired_error());
        }

        tracing::debug!(entity_id = %self.original_id, lock_key = %self.lock.lock_key, "committed");
        self.emit(
            LockAction::Commit,
            json!({ "lock_key": self.lock.lock_key.to_string() }),
        );
        Ok(committed.entity)
    }

    async fn commit_delete(&mut self) -> Result<T> {
        self.check_released()?;
        self.check_validity()?;

        self.released = true;
        let deleted = self
            .ctx
            .store
            .conditional_delete(&self.key_filter())
            .await?
            .ok_or_else(|| self.expired_error())?;

        tracing::debug!(entity_id = %self.original_id, lock_key = %self.lock.lock_key, "deleted");
        self.emit(
            LockAction::Delete,
            json!({ "lock_key": self.lock.lock_key.to_string() }),
        );
        match decode::<T>(deleted) {
            Ok(record) => Ok(record.into_inner()),
            Err(e) => Err(DocLockError::StoreError(format!(
                "entity '{}' was deleted, but the removed document could not be read back: {}",
                self.original_id, e
            ))),
        }
    }

    async fn abandon(&mut self) -> Result<()> {
        self.check_released()?;

        self.released = true;
        let cleared = self
            .ctx
            .store
            .conditional_update(&self.key_filter(), &Update::new().unset(LOCK_FIELD))
            .await?
            .is_some();

        if !cleared {
            tracing::debug!(
                entity_id = %self.original_id,
                lock_key = %self.lock.lock_key,
                "abandon found the lease already superseded"
            );
        }
        self.emit(
            LockAction::Abandon,
            json!({
                "lock_key": self.lock.lock_key.to_string(),
                "cleared": cleared,
            }),
        );
        Ok(())
    }

    async fn set_exception(&mut self, info: ExceptionInfo) -> Result<()> {
        self.check_released()?;
        self.check_validity()?;

        let update = Update::new().set(EXCEPTION_INFO_PATH, serde_json::to_value(&info)?);
        self.released = true;
        let updated = self
            .ctx
            .store
            .conditional_update(&self.key_filter(), &update)
            .await?;
        if updated.is_none() {
            return Err(self.expired_error());
        }

        tracing::warn!(
            entity_id = %self.original_id,
            error_type = %info.kind,
            "entity held with exception: {}",
            info.message
        );
        self.emit(
            LockAction::ErrorState,
            json!({
                "lock_key": self.lock.lock_key.to_string(),
                "type": info.kind,
                "message": info.message,
            }),
        );
        Ok(())
    }
}

impl<T> Drop for ScopeCore<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let id = self.original_id.clone();
        let lock = self.lock.clone();
        tracing::warn!(
            entity_id = %id,
            lock_key = %lock.lock_key,
            "scope dropped without release"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                entity_id = %id,
                "no async runtime to abandon dropped scope; lease lapses at {}",
                lock.expire_time
            );
            return;
        };

        let store = Arc::clone(&self.ctx.store);
        let observer = Arc::clone(&self.ctx.observer);
        let task = runtime.spawn(abandon_dropped(store, observer, id, lock));
        self.ctx.pending.track(task);
    }
}

/// Abandon on behalf of a dropped scope, holding the entity if that fails.
async fn abandon_dropped(
    store: Arc<dyn DocumentStore>,
    observer: Arc<dyn LockObserver>,
    id: String,
    lock: Lock,
) {
    let filter = key_filter(&id, lock.lock_key);
    let error = match store
        .conditional_update(&filter, &Update::new().unset(LOCK_FIELD))
        .await
    {
        Ok(prior) => {
            observer.on_event(
                &LockEvent::new(LockAction::DropAbandon, &id)
                    .with_actor(lock.actor.as_deref())
                    .with_details(json!({
                        "lock_key": lock.lock_key.to_string(),
                        "cleared": prior.is_some(),
                    })),
            );
            return;
        }
        Err(e) => e,
    };

    tracing::error!(entity_id = %id, error = %error, "failed to abandon dropped scope");

    let info = ExceptionInfo::from_error(&error);
    let recorded = match serde_json::to_value(&info) {
        Ok(value) => store
            .conditional_update(&filter, &Update::new().set(EXCEPTION_INFO_PATH, value))
            .await
            .map(|prior| prior.is_some()),
        Err(e) => Err(e.into()),
    };
    match &recorded {
        Ok(true) => {
            tracing::error!(entity_id = %id, "entity held with exception after failed abandon");
        }
        Ok(false) => {
            tracing::debug!(entity_id = %id, "lease superseded before exception could be recorded");
        }
        Err(e) => {
            tracing::error!(entity_id = %id, error = %e, "failed to record exception info");
        }
    }

    observer.on_event(
        &LockEvent::new(LockAction::DropAbandonFailed, &id)
            .with_actor(lock.actor.as_deref())
            .with_details(json!({
                "lock_key": lock.lock_key.to_string(),
                "error": error.to_string(),
                "recorded": matches!(recorded, Ok(true)),
            })),
    );
}

fn key_filter(id: &str, key: LockKey) -> Filter {
    Filter::id(id).and(Filter::LockKey(key))
}

/// Exclusive hold on an entity for update.
///
/// Release exactly once with [`commit`](Self::commit), [`abandon`](Self::abandon)
/// or [`set_error_state`](Self::set_error_state). A second release fails with
/// [`DocLockError::LockAlreadyReleased`]. A scope dropped unreleased is abandoned
/// by a task tracked in the repository's [`PendingReleases`].
#[must_use = "a scope must be released with commit, abandon, or set_error_state"]
pub struct EntityScope<T> {
    core: ScopeCore<T>,
}

impl<T: Entity> EntityScope<T> {
    pub(super) fn new(core: ScopeCore<T>) -> Self {
        Self { core }
    }

    /// Id the scope was acquired for.
    pub fn id(&self) -> &str {
        &self.core.original_id
    }

    /// Entity as it was when acquired, plus any local edits.
    pub fn entity(&self) -> &T {
        &self.core.record.entity
    }

    pub fn entity_mut(&mut self) -> &mut T {
        &mut self.core.record.entity
    }

    pub fn lock_key(&self) -> LockKey {
        self.core.lock.lock_key
    }

    pub fn lock_time(&self) -> DateTime<Utc> {
        self.core.lock.lock_time
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.core.lock.expire_time
    }

    pub fn lease_window(&self) -> Duration {
        self.core.lock.lease_window()
    }

    pub fn unlock_counter(&self) -> u32 {
        self.core.record.unlock_counter
    }

    pub fn is_released(&self) -> bool {
        self.core.released
    }

    /// Persist the scope's entity and release the lease.
    pub async fn commit(&mut self) -> Result<T> {
        let entity = self.core.record.entity.clone();
        self.core.commit_update(entity).await
    }

    /// Persist `updated` and release the lease.
    ///
    /// Fails with [`DocLockError::UnlockDifferentEntity`] if `updated` has a
    /// different id, and with [`DocLockError::LockExpired`] if the lease
    /// window has passed or the lease was reclaimed.
    pub async fn commit_with(&mut self, updated: T) -> Result<T> {
        self.core.commit_update(updated).await
    }

    /// Release the lease without persisting anything.
    pub async fn abandon(&mut self) -> Result<()> {
        self.core.abandon().await
    }

    /// Hold the entity permanently, recording `error` as its exception info.
    pub async fn set_error_state<E>(&mut self, error: &E) -> Result<()>
    where
        E: std::error::Error + ?Sized,
    {
        self.core.set_exception(ExceptionInfo::from_error(error)).await
    }

    /// Hold the entity permanently with the given exception info.
    pub async fn set_exception(&mut self, info: ExceptionInfo) -> Result<()> {
        self.core.set_exception(info).await
    }
}

impl<T> fmt::Debug for EntityScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityScope")
            .field("id", &self.core.original_id)
            .field("lock_key", &self.core.lock.lock_key)
            .field("expires_at", &self.core.lock.expire_time)
            .field("released", &self.core.released)
            .finish_non_exhaustive()
    }
}

/// Exclusive hold on an entity for deletion.
///
/// Same release rules as [`EntityScope`]; [`commit`](Self::commit) deletes the
/// document.
#[must_use = "a scope must be released with commit, abandon, or set_error_state"]
pub struct DeleteScope<T> {
    core: ScopeCore<T>,
}

impl<T: Entity> DeleteScope<T> {
    pub(super) fn new(core: ScopeCore<T>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> &str {
        &self.core.original_id
    }

    pub fn entity(&self) -> &T {
        &self.core.record.entity
    }

    pub fn lock_key(&self) -> LockKey {
        self.core.lock.lock_key
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.core.lock.expire_time
    }

    pub fn is_released(&self) -> bool {
        self.core.released
    }

    /// Delete the document and release the lease, returning the deleted entity.
    pub async fn commit(&mut self) -> Result<T> {
        self.core.commit_delete().await
    }

    pub async fn abandon(&mut self) -> Result<()> {
        self.core.abandon().await
    }

    pub async fn set_error_state<E>(&mut self, error: &E) -> Result<()>
    where
        E: std::error::Error + ?Sized,
    {
        self.core.set_exception(ExceptionInfo::from_error(error)).await
    }

    pub async fn set_exception(&mut self, info: ExceptionInfo) -> Result<()> {
        self.core.set_exception(info).await
    }
}

impl<T> fmt::Debug for DeleteScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteScope")
            .field("id", &self.core.original_id)
            .field("lock_key", &self.core.lock.lock_key)
            .field("expires_at", &self.core.lock.expire_time)
            .field("released", &self.core.released)
            .finish_non_exhaustive()
    }
}
