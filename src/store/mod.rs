//! Document store contract for doclock.
//!
//! The lock protocol needs very little from the storage layer: a point read and
//! a handful of **single-document atomic conditional writes**. The
//! [`DocumentStore`] trait captures exactly that contract.
//!
//! # Documents
//!
//! Documents are JSON objects. Every document carries its id in the `_id`
//! field; the lock record, when present, lives under `lock`.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: a process-local store, each conditional write evaluated
//!   and applied under one mutex.
//! - [`FileStore`]: one JSON file per document in a collection directory.
//!   Conditional writes are serialized across processes by an advisory lock on
//!   a collection mutex file and land with an atomic rename.

mod file;
mod filter;
mod memory;

#[cfg(test)]
mod tests;

pub use file::FileStore;
pub use filter::{Filter, Update, document_state};
pub(crate) use filter::set_lock;
pub use memory::MemoryStore;

use crate::error::{DocLockError, Result};
use crate::lock::{LOCK_FIELD, Lock};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored document.
pub type Document = Map<String, Value>;

/// Field holding the document id.
pub const ID_FIELD: &str = "_id";

/// Storage collaborator used by the repository.
///
/// Every conditional operation must evaluate its filter and apply its write as
/// one atomic step with respect to other writers of the same document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn find_one(&self, id: &str) -> Result<Option<Document>>;

    /// Fetch every document matching `filter`, ordered by id.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>>;

    /// Insert a new document. Fails if the id already exists.
    async fn insert(&self, document: Document) -> Result<()>;

    /// Apply `update` to at most one document matching `filter`.
    ///
    /// Returns the document as it was before the update, or `None` if nothing matched.
    async fn conditional_update(&self, filter: &Filter, update: &Update)
    -> Result<Option<Document>>;

    /// Replace at most one document matching `filter` with `document`.
    ///
    /// Returns the prior value, or `None` if nothing matched.
    async fn conditional_replace(
        &self,
        filter: &Filter,
        document: Document,
    ) -> Result<Option<Document>>;

    /// Delete at most one document matching `filter`, returning the deleted value.
    async fn conditional_delete(&self, filter: &Filter) -> Result<Option<Document>>;

    /// Apply `update` to every matching document, returning the number updated.
    async fn update_many(&self, filter: &Filter, update: &Update) -> Result<u64>;

    /// Delete every matching document, returning the number deleted.
    async fn delete_many(&self, filter: &Filter) -> Result<u64>;
}

/// Read the id of a document.
pub fn document_id(document: &Document) -> Result<&str> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| DocLockError::UserError(format!("document has no string '{}'", ID_FIELD)))
}

/// Decode the embedded lock record of a document.
pub fn document_lock(document: &Document) -> Result<Option<Lock>> {
    match document.get(LOCK_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// Check that a replacement keeps the id of the document it replaces.
pub(crate) fn ensure_same_id(existing: &Document, replacement: &Document) -> Result<()> {
    let current = document_id(existing)?;
    let next = document_id(replacement)?;
    if current != next {
        return Err(DocLockError::UserError(format!(
            "replacement for document '{}' carries a different id '{}'",
            current, next
        )));
    }
    Ok(())
}
