//! Process-local document store.

use super::{Document, DocumentStore, Filter, Update, document_id, ensure_same_id};
use crate::error::{DocLockError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory store. Each operation runs under a single mutex, which makes every
/// conditional write atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents().is_empty()
    }

    fn documents(&self) -> MutexGuard<'_, BTreeMap<String, Document>> {
        // A panicking writer never leaves a half-applied document behind,
        // so a poisoned map is still consistent.
        self.documents
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Id of the first document matching `filter`.
fn first_match(documents: &BTreeMap<String, Document>, filter: &Filter) -> Option<String> {
    match filter.target_id() {
        Some(id) => documents
            .get(id)
            .filter(|doc| filter.matches(doc))
            .map(|_| id.to_string()),
        None => documents
            .iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone()),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents().get(id).cloned())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .documents()
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn insert(&self, document: Document) -> Result<()> {
        let id = document_id(&document)?.to_string();
        let mut documents = self.documents();
        if documents.contains_key(&id) {
            return Err(DocLockError::StoreError(format!(
                "document '{}' already exists",
                id
            )));
        }
        documents.insert(id, document);
        Ok(())
    }

    async fn conditional_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>> {
        let mut documents = self.documents();
        let Some(id) = first_match(&documents, filter) else {
            return Ok(None);
        };
        let Some(current) = documents.get_mut(&id) else {
            return Ok(None);
        };
        let prior = current.clone();
        update.apply(current)?;
        Ok(Some(prior))
    }

    async fn conditional_replace(
        &self,
        filter: &Filter,
        document: Document,
    ) -> Result<Option<Document>> {
        let mut documents = self.documents();
        let Some(id) = first_match(&documents, filter) else {
            return Ok(None);
        };
        let Some(current) = documents.get_mut(&id) else {
            return Ok(None);
        };
        ensure_same_id(current, &document)?;
        Ok(Some(std::mem::replace(current, document)))
    }

    async fn conditional_delete(&self, filter: &Filter) -> Result<Option<Document>> {
        let mut documents = self.documents();
        Ok(first_match(&documents, filter).and_then(|id| documents.remove(&id)))
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> Result<u64> {
        let mut documents = self.documents();

        // Apply to copies first so a failing update leaves the batch untouched.
        let mut updated = Vec::new();
        for (id, doc) in documents.iter() {
            if filter.matches(doc) {
                let mut next = doc.clone();
                update.apply(&mut next)?;
                updated.push((id.clone(), next));
            }
        }

        let count = updated.len() as u64;
        documents.extend(updated);
        Ok(count)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let mut documents = self.documents();
        let before = documents.len();
        documents.retain(|_, doc| !filter.matches(doc));
        Ok((before - documents.len()) as u64)
    }
}
