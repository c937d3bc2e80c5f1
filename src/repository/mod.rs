//! Lockable-entity repository.
//!
//! This module implements the lease protocol that lets independent processes
//! take turns editing or deleting documents in a shared store:
//! - Acquire (`pick`, `wait`, and their delete-flavored variants)
//! - Release through the returned scope (`commit`, `abandon`, `set_error_state`)
//! - Administrative release for operators (`release_one`, `release_all`)
//! - Query views and bulk writes restricted to unlocked documents
//!
//! # Synchronization
//!
//! The store's atomic single-document conditional write is the only primitive.
//! Acquire claims a document only if it is unlocked or expired; every release
//! is conditioned on the scope's fencing token, so a holder whose lease was
//! reclaimed can never overwrite the new holder's work.
//!
//! # Scopes
//!
//! A successful acquire returns a scope that must be released exactly once.
//! A scope dropped without release is abandoned by a task tracked in the
//! repository's [`PendingReleases`]; if that abandon fails, the failure is
//! recorded on the document as exception info.

mod acquire;
mod admin;
mod bulk;
mod scope;
mod views;


pub use acquire::{AcquireOptions, WaitOptions};
pub use scope::{DeleteScope, EntityScope, PendingReleases};
pub use views::LockStateCounts;

use crate::config::Config;
use crate::error::{DocLockError, Result};
use crate::events::{LockEvent, LockObserver, NdjsonObserver, TracingObserver};
use crate::lock::{Lock, LockState, classify};
use crate::store::{Document, DocumentStore, Filter, ID_FIELD};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// A record type stored through a [`Repository`].
///
/// The entity must serialize to a JSON object. The fields `_id`, `lock` and
/// `unlock_counter` are reserved for the repository.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Document id.
    fn id(&self) -> &str;
}

/// A stored entity together with its lock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockableEntity<T> {
    #[serde(flatten)]
    pub entity: T,

    /// Lock record, present only while locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,

    /// Number of administrative forced unlocks.
    #[serde(default)]
    pub unlock_counter: u32,
}

impl<T> LockableEntity<T> {
    /// Wrap an entity with no lock.
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            lock: None,
            unlock_counter: 0,
        }
    }

    /// Lock status at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> LockState {
        classify(self.lock.as_ref(), now)
    }

    /// Lock status right now.
    pub fn state(&self) -> LockState {
        self.state_at(Utc::now())
    }

    pub fn into_inner(self) -> T {
        self.entity
    }
}

impl<T> Deref for LockableEntity<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entity
    }
}

/// Schemaless entity: an id plus arbitrary JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEntity {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DynamicEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl Entity for DynamicEntity {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Timing knobs for acquire, wait, and administrative release.
#[derive(Debug, Clone, PartialEq)]
pub struct LockSettings {
    /// Lease used when an acquire does not name one.
    pub default_lease: chrono::Duration,
    /// First pause between `wait` attempts.
    pub poll_interval: Duration,
    /// Longest pause between `wait` attempts.
    pub max_backoff: Duration,
    /// Forced unlock count at which a warning is logged.
    pub unlock_warn_threshold: u32,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl LockSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_lease: config.default_lease(),
            poll_interval: config.wait_poll_interval(),
            max_backoff: config.wait_max_backoff(),
            unlock_warn_threshold: config.unlock_warn_threshold,
        }
    }
}

/// Repository of lockable entities of type `T` over a document store.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    observer: Arc<dyn LockObserver>,
    settings: LockSettings,
    pending: PendingReleases,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            observer: Arc::clone(&self.observer),
            settings: self.settings.clone(),
            pending: self.pending.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    /// Create a repository with default settings, reporting events to tracing.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            observer: Arc::new(TracingObserver),
            settings: LockSettings::default(),
            pending: PendingReleases::default(),
            _entity: PhantomData,
        }
    }

    /// Create a repository configured from `config`.
    ///
    /// When `events_log` is set, events are appended to that NDJSON file.
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let repository = Self::new(store).with_settings(LockSettings::from_config(config));
        match &config.events_log {
            Some(path) => repository.with_observer(Arc::new(NdjsonObserver::new(path))),
            None => repository,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LockObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_settings(mut self, settings: LockSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Insert a new, unlocked entity.
    pub async fn add(&self, entity: T) -> Result<()> {
        if entity.id().is_empty() {
            return Err(DocLockError::UserError(
                "entity id must be non-empty".to_string(),
            ));
        }
        let document = encode(&LockableEntity::new(entity))?;
        self.store.insert(document).await
    }

    /// Fetch an entity and its lock state.
    pub async fn get_one(&self, id: &str) -> Result<Option<LockableEntity<T>>> {
        self.store.find_one(id).await?.map(decode::<T>).transpose()
    }

    /// Fetch every entity matching `filter`.
    pub async fn find(&self, filter: &Filter) -> Result<Vec<LockableEntity<T>>> {
        self.store
            .find(filter)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Fetch every entity.
    pub async fn get_all(&self) -> Result<Vec<LockableEntity<T>>> {
        self.find(&Filter::All).await
    }

    /// Number of dropped-scope abandons still running.
    pub fn pending_releases(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every dropped-scope abandon to finish.
    pub async fn drain_pending_releases(&self) {
        self.pending.drain().await;
    }

    fn emit(&self, event: LockEvent) {
        self.observer.on_event(&event);
    }
}

/// Encode an entity record as a store document.
pub(crate) fn encode<T: Entity>(record: &LockableEntity<T>) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(mut document) => {
            document.insert(
                ID_FIELD.to_string(),
                Value::String(record.entity.id().to_string()),
            );
            Ok(document)
        }
        _ => Err(DocLockError::UserError(format!(
            "entity of type {} must serialize to a JSON object",
            short_type_name::<T>()
        ))),
    }
}

/// Decode a store document into an entity record.
pub(crate) fn decode<T: Entity>(document: Document) -> Result<LockableEntity<T>> {
    let id = document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string();
    serde_json::from_value(Value::Object(document)).map_err(|e| DocLockError::Undecodable {
        id,
        entity_type: short_type_name::<T>(),
        reason: e.to_string(),
    })
}

/// Unqualified type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
