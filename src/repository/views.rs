//! Read-only views of entities by lock state.

use super::{Entity, LockableEntity, Repository, decode};
use crate::error::Result;
use crate::lock::{LockState, LockedMode};
use crate::store::{DocumentStore, Filter, document_state};
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// Number of documents in each lock state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStateCounts {
    pub unlocked: u64,
    pub active: u64,
    pub expired: u64,
    pub exception: u64,
}

impl LockStateCounts {
    pub fn total(&self) -> u64 {
        self.unlocked + self.active + self.expired + self.exception
    }

    fn record(&mut self, state: LockState) {
        match state {
            LockState::Unlocked => self.unlocked += 1,
            LockState::Active => self.active += 1,
            LockState::Expired => self.expired += 1,
            LockState::Exception => self.exception += 1,
        }
    }
}

impl<T: Entity> Repository<T> {
    /// Entities held in the state `mode` selects.
    pub fn get_locked(&self, mode: LockedMode) -> BoxStream<'static, Result<LockableEntity<T>>> {
        self.get_by_state(&[mode.state()])
    }

    /// Entities an acquire could claim now: unlocked or expired.
    pub fn get_unlocked(&self) -> BoxStream<'static, Result<LockableEntity<T>>> {
        self.get_by_state(LockState::ACQUIRABLE)
    }

    /// Entities whose lease has lapsed without release.
    pub fn get_expired(&self) -> BoxStream<'static, Result<LockableEntity<T>>> {
        self.get_by_state(&[LockState::Expired])
    }

    /// Tally every document by its lock state.
    pub async fn count_by_state(&self) -> Result<LockStateCounts> {
        let now = Utc::now();
        let mut counts = LockStateCounts::default();
        for document in self.store.find(&Filter::All).await? {
            counts.record(document_state(&document, now));
        }
        Ok(counts)
    }

    /// Entities in any of `states`.
    pub fn get_by_state(&self, states: &[LockState]) -> BoxStream<'static, Result<LockableEntity<T>>> {
        self.stream_filter(Filter::lock_state(states, Utc::now()))
    }

    /// Every entity, decoded one at a time.
    ///
    /// Unlike [`Repository::get_all`], a document that fails to decode yields
    /// an error item and the stream continues.
    pub fn stream_all(&self) -> BoxStream<'static, Result<LockableEntity<T>>> {
        self.stream_filter(Filter::All)
    }

    fn stream_filter(&self, filter: Filter) -> BoxStream<'static, Result<LockableEntity<T>>> {
        let store: Arc<dyn DocumentStore> = Arc::clone(&self.store);

        stream::once(async move { store.find(&filter).await })
            .map(|found| match found {
                Ok(documents) => stream::iter(documents.into_iter().map(decode::<T>)).boxed(),
                Err(e) => stream::iter([Err(e)]).boxed(),
            })
            .flatten()
            .boxed()
    }
}
