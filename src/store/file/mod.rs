//! Directory-backed document store.
//!
//! # Layout
//!
//! ```text
//! {root}/{collection}/
//!   .collection.lock     writer mutex (advisory lock + holder info)
//!   {encoded id}.json    one document per file
//! ```
//!
//! Reads go straight to the files; atomic renames mean a reader never sees a
//! partial document. Every write (conditional or bulk) holds the collection
//! mutex from the moment it evaluates its filter until its last rename, which
//! is what makes conditional writes atomic across processes.

mod atomic;
mod mutex;

use super::{Document, DocumentStore, Filter, ID_FIELD, Update, document_id, ensure_same_id};
use crate::error::{DocLockError, Result};
use async_trait::async_trait;
use atomic::atomic_write;
use mutex::CollectionMutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time a writer waits for the collection mutex.
const DEFAULT_MUTEX_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store keeping one JSON file per document.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    mutex_timeout: Duration,
}

impl FileStore {
    /// Open (creating if needed) the collection directory `{root}/{collection}`.
    pub fn open<P: AsRef<Path>>(root: P, collection: &str) -> Result<Self> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DocLockError::UserError(format!(
                "invalid collection name '{}': use letters, digits, '_' or '-'",
                collection
            )));
        }

        let dir = root.as_ref().join(collection);
        fs::create_dir_all(&dir).map_err(|e| {
            DocLockError::StoreError(format!(
                "failed to create collection directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self {
            dir,
            mutex_timeout: DEFAULT_MUTEX_TIMEOUT,
        })
    }

    /// Set how long writers wait for the collection mutex.
    pub fn with_mutex_timeout(mut self, timeout: Duration) -> Self {
        self.mutex_timeout = timeout;
        self
    }

    /// The collection directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run a blocking closure on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| DocLockError::StoreError(format!("store task failed: {}", e)))?
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let guard = CollectionMutex::acquire(&self.dir, self.mutex_timeout)?;
        tracing::trace!(mutex = %guard.path().display(), "collection mutex acquired");
        f()
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(id)))
    }

    fn read_path(&self, path: &Path) -> Result<Option<Document>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DocLockError::StoreError(format!(
                    "failed to read document '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            DocLockError::StoreError(format!(
                "failed to parse document '{}': {}",
                path.display(),
                e
            ))
        })
    }

    fn read_one(&self, id: &str) -> Result<Option<Document>> {
        self.read_path(&self.document_path(id))
    }

    fn read_all(&self) -> Result<Vec<Document>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            DocLockError::StoreError(format!(
                "failed to read collection directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                DocLockError::StoreError(format!("failed to read collection entry: {}", e))
            })?;
            let path = entry.path();

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            // Deleted between listing and reading.
            if let Some(document) = self.read_path(&path)? {
                documents.push(document);
            }
        }

        documents.sort_by(|a, b| id_of(a).cmp(id_of(b)));
        Ok(documents)
    }

    /// Documents matching `filter`, reading a single file when the filter pins an id.
    fn matching(&self, filter: &Filter) -> Result<Vec<Document>> {
        let candidates = match filter.target_id() {
            Some(id) => self.read_one(id)?.into_iter().collect(),
            None => self.read_all()?,
        };
        Ok(candidates
            .into_iter()
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    fn write(&self, document: &Document) -> Result<()> {
        let id = document_id(document)?;
        let content = serde_json::to_vec_pretty(document)?;
        atomic_write(&self.document_path(id), &content)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.document_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocLockError::StoreError(format!(
                "failed to delete document '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

fn id_of(document: &Document) -> &str {
    document
        .get(ID_FIELD)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
}

/// Encode an id as a file stem: ASCII alphanumerics, `-` and `_` pass through,
/// every other byte becomes `%XX`.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn find_one(&self, id: &str) -> Result<Option<Document>> {
        let id = id.to_string();
        self.blocking(move |store| store.read_one(&id)).await
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let filter = filter.clone();
        self.blocking(move |store| store.matching(&filter)).await
    }

    async fn insert(&self, document: Document) -> Result<()> {
        self.blocking(move |store| {
            let id = document_id(&document)?.to_string();
            store.locked(|| {
                if store.read_one(&id)?.is_some() {
                    return Err(DocLockError::StoreError(format!(
                        "document '{}' already exists",
                        id
                    )));
                }
                store.write(&document)
            })
        })
        .await
    }

    async fn conditional_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>> {
        let filter = filter.clone();
        let update = update.clone();
        self.blocking(move |store| {
            store.locked(|| {
                let Some(prior) = store.matching(&filter)?.into_iter().next() else {
                    return Ok(None);
                };
                let mut next = prior.clone();
                update.apply(&mut next)?;
                store.write(&next)?;
                Ok(Some(prior))
            })
        })
        .await
    }

    async fn conditional_replace(
        &self,
        filter: &Filter,
        document: Document,
    ) -> Result<Option<Document>> {
        let filter = filter.clone();
        self.blocking(move |store| {
            store.locked(|| {
                let Some(prior) = store.matching(&filter)?.into_iter().next() else {
                    return Ok(None);
                };
                ensure_same_id(&prior, &document)?;
                store.write(&document)?;
                Ok(Some(prior))
            })
        })
        .await
    }

    async fn conditional_delete(&self, filter: &Filter) -> Result<Option<Document>> {
        let filter = filter.clone();
        self.blocking(move |store| {
            store.locked(|| {
                let Some(prior) = store.matching(&filter)?.into_iter().next() else {
                    return Ok(None);
                };
                store.remove(document_id(&prior)?)?;
                Ok(Some(prior))
            })
        })
        .await
    }

    async fn update_many(&self, filter: &Filter, update: &Update) -> Result<u64> {
        let filter = filter.clone();
        let update = update.clone();
        self.blocking(move |store| {
            store.locked(|| {
                let mut updated = Vec::new();
                for document in store.matching(&filter)? {
                    let mut next = document;
                    update.apply(&mut next)?;
                    updated.push(next);
                }
                for document in &updated {
                    store.write(document)?;
                }
                Ok(updated.len() as u64)
            })
        })
        .await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let filter = filter.clone();
        self.blocking(move |store| {
            store.locked(|| {
                let matched = store.matching(&filter)?;
                for document in &matched {
                    store.remove(document_id(document)?)?;
                }
                Ok(matched.len() as u64)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id("order-42_a"), "order-42_a");
        assert_eq!(encode_id("a/b"), "a%2Fb");
        assert_eq!(encode_id("..x"), "%2E%2Ex");
        assert_eq!(encode_id("é"), "%C3%A9");
    }

    #[test]
    fn test_open_rejects_bad_collection_names() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(FileStore::open(temp_dir.path(), "../escape").is_err());
        assert!(FileStore::open(temp_dir.path(), "").is_err());
        assert!(FileStore::open(temp_dir.path(), "orders").is_ok());
    }
}
