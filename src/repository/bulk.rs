//! Bulk writes restricted to unlocked documents.

use super::{Entity, Repository};
use crate::error::{DocLockError, Result};
use crate::lock::{LOCK_FIELD, UNLOCK_COUNTER_FIELD};
use crate::store::{Filter, ID_FIELD, Update};
use chrono::Utc;

/// Fields only the lock protocol may write.
const PROTECTED_FIELDS: [&str; 3] = [ID_FIELD, LOCK_FIELD, UNLOCK_COUNTER_FIELD];

impl<T: Entity> Repository<T> {
    /// Apply `update` to every document matching `filter` that is unlocked or expired.
    ///
    /// Held documents are skipped. Returns the number updated.
    pub async fn update_unlocked(&self, filter: Filter, update: Update) -> Result<u64> {
        if let Some(field) = PROTECTED_FIELDS.iter().find(|f| update.touches(f)) {
            return Err(DocLockError::UserError(format!(
                "bulk updates may not modify '{}'",
                field
            )));
        }

        let filter = filter.and(Filter::acquirable(Utc::now()));
        let updated = self.store.update_many(&filter, &update).await?;
        tracing::debug!(updated, "bulk update of unlocked entities");
        Ok(updated)
    }

    /// Delete every document matching `filter` that is unlocked or expired.
    ///
    /// Held documents are skipped. Returns the number deleted.
    pub async fn delete_many_unlocked(&self, filter: Filter) -> Result<u64> {
        let filter = filter.and(Filter::acquirable(Utc::now()));
        let deleted = self.store.delete_many(&filter).await?;
        tracing::debug!(deleted, "bulk delete of unlocked entities");
        Ok(deleted)
    }
}
