//! Lease acquisition: `pick`, `wait`, and their delete-flavored variants.

use super::scope::{DeleteScope, EntityScope, ScopeContext, ScopeCore};
use super::{Entity, LockableEntity, Repository, decode};
use crate::error::{DocLockError, Result};
use crate::events::{LockAction, LockEvent};
use crate::lock::{LOCK_FIELD, Lock, LockState};
use crate::store::{Filter, Update, document_lock, document_state, set_lock};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

/// Attempts made when the document is seen unlocked right after a failed claim.
const ACQUIRE_ATTEMPTS: usize = 3;

/// Smallest pause between `wait` attempts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Deadline used when a timeout does not fit in an `Instant`: about thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Options for a single acquire.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Lease length; the repository default when unset.
    pub lease: Option<chrono::Duration>,
    /// Caller identity recorded on the lock.
    pub actor: Option<String>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease(mut self, lease: chrono::Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Options for a polling acquire.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Give up once this instant has passed.
    pub deadline: Instant,
    /// First pause between attempts; the repository default when unset.
    pub poll_interval: Option<Duration>,
    /// Longest pause between attempts; the repository default when unset.
    pub max_backoff: Option<Duration>,
    /// Lease and actor for the acquire itself.
    pub acquire: AcquireOptions,
}

impl WaitOptions {
    /// Wait at most `timeout` from now. `Duration::MAX` waits indefinitely.
    pub fn timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        Self::until(now.checked_add(timeout).unwrap_or(now + FAR_FUTURE))
    }

    /// Wait until `deadline`.
    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline,
            poll_interval: None,
            max_backoff: None,
            acquire: AcquireOptions::default(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    pub fn lease(mut self, lease: chrono::Duration) -> Self {
        self.acquire.lease = Some(lease);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.acquire.actor = Some(actor.into());
        self
    }
}

/// A freshly claimed document and the lock that claimed it.
pub(super) struct Acquired<T> {
    pub(super) record: LockableEntity<T>,
    pub(super) lock: Lock,
}

impl<T: Entity> Repository<T> {
    /// Claim `id` for exclusive update.
    ///
    /// Returns `Ok(None)` if the document does not exist. Fails with
    /// [`DocLockError::Locked`] when another lease is active and with
    /// [`DocLockError::LockErrorState`] when exception info is attached.
    pub async fn pick(&self, id: &str, options: AcquireOptions) -> Result<Option<EntityScope<T>>> {
        let acquired = self.acquire(id, &options, LockAction::Pick).await?;
        Ok(acquired.map(|a| EntityScope::new(self.scope_core(a))))
    }

    /// Claim `id` for exclusive delete. Same rules as [`Repository::pick`].
    pub async fn pick_for_delete(
        &self,
        id: &str,
        options: AcquireOptions,
    ) -> Result<Option<DeleteScope<T>>> {
        let acquired = self.acquire(id, &options, LockAction::PickForDelete).await?;
        Ok(acquired.map(|a| DeleteScope::new(self.scope_core(a))))
    }

    /// Poll [`Repository::pick`] until it succeeds or the deadline passes.
    ///
    /// Stops early, without waiting, when the document is absent (`Ok(None)`)
    /// or has exception info attached. Fails with [`DocLockError::Timeout`] at
    /// the deadline.
    pub async fn wait(&self, id: &str, options: WaitOptions) -> Result<Option<EntityScope<T>>> {
        let acquired = self.wait_acquire(id, &options, LockAction::Pick).await?;
        Ok(acquired.map(|a| EntityScope::new(self.scope_core(a))))
    }

    /// Poll [`Repository::pick_for_delete`] until it succeeds or the deadline passes.
    pub async fn wait_for_delete(
        &self,
        id: &str,
        options: WaitOptions,
    ) -> Result<Option<DeleteScope<T>>> {
        let acquired = self
            .wait_acquire(id, &options, LockAction::PickForDelete)
            .await?;
        Ok(acquired.map(|a| DeleteScope::new(self.scope_core(a))))
    }

    fn scope_core(&self, acquired: Acquired<T>) -> ScopeCore<T> {
        ScopeCore::new(
            acquired.record,
            acquired.lock,
            ScopeContext {
                store: self.store.clone(),
                observer: self.observer.clone(),
                pending: self.pending.clone(),
            },
        )
    }

    async fn acquire(
        &self,
        id: &str,
        options: &AcquireOptions,
        action: LockAction,
    ) -> Result<Option<Acquired<T>>> {
        let lease = options.lease.unwrap_or(self.settings.default_lease);
        if lease < chrono::Duration::zero() {
            return Err(DocLockError::UserError(format!(
                "lease for entity '{}' must not be negative",
                id
            )));
        }

        for attempt in 1..=ACQUIRE_ATTEMPTS {
            let lock = Lock::new(Utc::now(), lease, options.actor.clone())?;
            let filter = Filter::id(id).and(Filter::acquirable(lock.lock_time));

            if let Some(prior) = self.store.conditional_update(&filter, &set_lock(&lock)?).await? {
                let record = match decode::<T>(prior) {
                    Ok(record) => record,
                    Err(e) => {
                        self.undo_claim(id, &lock).await;
                        return Err(e);
                    }
                };

                tracing::debug!(
                    entity_id = id,
                    lock_key = %lock.lock_key,
                    lease_ms = lease.num_milliseconds(),
                    "lease acquired"
                );
                self.emit(
                    LockEvent::new(action, id)
                        .with_actor(lock.actor.as_deref())
                        .with_details(json!({
                            "lock_key": lock.lock_key.to_string(),
                            "lease_ms": lease.num_milliseconds(),
                            "expire_time": lock.expire_time,
                        })),
                );
                return Ok(Some(Acquired { record, lock }));
            }

            let Some(current) = self.store.find_one(id).await? else {
                return Ok(None);
            };

            match document_state(&current, Utc::now()) {
                LockState::Exception => {
                    return Err(DocLockError::LockErrorState { id: id.to_string() });
                }
                LockState::Active => {
                    if let Some(held) = document_lock(&current)? {
                        return Err(DocLockError::Locked {
                            id: id.to_string(),
                            actor: held.holder().to_string(),
                            lease: held.lease_window(),
                        });
                    }
                }
                LockState::Unlocked | LockState::Expired => {}
            }

            // Released between the claim and the re-read.
            tracing::debug!(entity_id = id, attempt, "lock released during acquire, retrying");
        }

        Err(DocLockError::Locked {
            id: id.to_string(),
            actor: "unknown".to_string(),
            lease,
        })
    }

    /// Clear a lock this repository just installed but cannot hand out.
    async fn undo_claim(&self, id: &str, lock: &Lock) {
        let filter = Filter::id(id).and(Filter::LockKey(lock.lock_key));
        if let Err(e) = self
            .store
            .conditional_update(&filter, &Update::new().unset(LOCK_FIELD))
            .await
        {
            tracing::warn!(
                entity_id = id,
                error = %e,
                "failed to clear lock on undecodable entity; it will expire at {}",
                lock.expire_time
            );
        }
    }

    async fn wait_acquire(
        &self,
        id: &str,
        options: &WaitOptions,
        action: LockAction,
    ) -> Result<Option<Acquired<T>>> {
        let started = Instant::now();
        let mut interval = options
            .poll_interval
            .unwrap_or(self.settings.poll_interval)
            .max(MIN_POLL_INTERVAL);
        let max_backoff = options
            .max_backoff
            .unwrap_or(self.settings.max_backoff)
            .max(interval);

        loop {
            match self.acquire(id, &options.acquire, action).await {
                Ok(acquired) => return Ok(acquired),
                Err(DocLockError::Locked { .. }) => {}
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= options.deadline {
                let waited = chrono::Duration::from_std(now.duration_since(started))
                    .unwrap_or_else(|_| chrono::Duration::zero());
                return Err(DocLockError::Timeout {
                    id: id.to_string(),
                    waited,
                });
            }

            tokio::time::sleep(interval.min(options.deadline - now)).await;
            interval = interval.saturating_mul(2).min(max_backoff);
        }
    }
}
