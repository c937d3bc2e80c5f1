//! Administrative release for operators.

use super::{Entity, Repository};
use crate::error::Result;
use crate::events::{LockAction, LockEvent};
use crate::lock::{LOCK_FIELD, ReleaseMode, UNLOCK_COUNTER_FIELD};
use crate::store::{Filter, Update, document_id, document_lock, document_state};
use chrono::Utc;
use serde_json::{Value, json};

impl<T: Entity> Repository<T> {
    /// Clear the lock on `id` if its state is selected by `mode`.
    ///
    /// No fencing token is checked. The document's `unlock_counter` is
    /// incremented, and a warning is logged once it reaches the configured
    /// threshold. Returns whether a lock was cleared.
    pub async fn release_one(&self, id: &str, mode: ReleaseMode) -> Result<bool> {
        let filter = Filter::id(id).and(Filter::lock_state(mode.states(), Utc::now()));
        let update = Update::new().unset(LOCK_FIELD).inc(UNLOCK_COUNTER_FIELD, 1);

        let Some(prior) = self.store.conditional_update(&filter, &update).await? else {
            tracing::debug!(entity_id = id, mode = %mode, "nothing to release");
            return Ok(false);
        };

        // Read lock fields loosely; the prior lock may be malformed.
        let previous_state = document_state(&prior, Utc::now());
        let holder = document_lock(&prior)
            .ok()
            .flatten()
            .map(|lock| lock.holder().to_string());
        let unlock_counter = prior
            .get(UNLOCK_COUNTER_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .saturating_add(1);

        tracing::info!(
            entity_id = id,
            previous_state = %previous_state,
            unlock_counter,
            "lock released administratively"
        );
        if unlock_counter >= u64::from(self.settings.unlock_warn_threshold) {
            tracing::warn!(
                entity_id = id,
                unlock_counter,
                "entity has been force-unlocked {} times",
                unlock_counter
            );
        }

        self.emit(
            LockEvent::new(LockAction::Release, id)
                .with_actor(holder.as_deref())
                .with_details(json!({
                    "mode": mode.to_string(),
                    "previous_state": previous_state.as_str(),
                    "unlock_counter": unlock_counter,
                })),
        );
        Ok(true)
    }

    /// Apply [`Repository::release_one`] to every document selected by `mode`.
    ///
    /// Returns the number of locks cleared.
    pub async fn release_all(&self, mode: ReleaseMode) -> Result<u64> {
        let candidates = self
            .store
            .find(&Filter::lock_state(mode.states(), Utc::now()))
            .await?;

        let mut released = 0;
        for document in &candidates {
            if self.release_one(document_id(document)?, mode).await? {
                released += 1;
            }
        }
        Ok(released)
    }
}
