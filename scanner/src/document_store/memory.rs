//! In-memory document store.
//!
//! Used by the console when no remote store is configured, and by tests.
//! Every call is recorded so tests can assert on what was read and written.

use super::{Document, DocumentStore, DocumentStoreError, StoreFuture, StoreResult};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A call made against the in-memory store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    /// `get_document(collection, id)`
    Get {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },
    /// `update_document(collection, id, fields)`
    Update {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
        /// Fields written
        fields: Document,
    },
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, HashMap<String, Document>>,
    calls: Vec<StoreCall>,
    outage: Option<DocumentStoreError>,
}

/// In-memory document store keyed by collection, then document id
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `collection` from a JSON object mapping document ids to documents
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::ResponseParseFailed`] if the JSON is not
    /// an object of objects.
    pub fn seed_json(&self, collection: &str, json: &str) -> StoreResult<usize> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DocumentStoreError::ResponseParseFailed(e.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(DocumentStoreError::ResponseParseFailed(
                "seed must be an object keyed by document id".to_string(),
            ));
        };

        let mut documents = Vec::with_capacity(entries.len());
        for (id, doc) in entries {
            let Value::Object(fields) = doc else {
                return Err(DocumentStoreError::ResponseParseFailed(format!(
                    "seed entry '{id}' is not an object"
                )));
            };
            documents.push((id, fields));
        }

        let count = documents.len();
        for (id, fields) in documents {
            self.insert(collection, &id, fields)?;
        }
        Ok(count)
    }

    /// Seed `collection` from a JSON file (see [`Self::seed_json`])
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Unavailable`] if the file cannot be read,
    /// or a parse error as for [`Self::seed_json`].
    pub fn seed_file(&self, collection: &str, path: &Path) -> StoreResult<usize> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            DocumentStoreError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        self.seed_json(collection, &json)
    }

    /// Insert or replace a document
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Unavailable`] if the store lock is poisoned.
    pub fn insert(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        self.lock()?
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    /// Current contents of a document, without recording a call
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .ok()?
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Every call made so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().map(|inner| inner.calls.clone()).unwrap_or_default()
    }

    /// Number of `get_document` calls so far
    #[must_use]
    pub fn get_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Get { .. }))
            .count()
    }

    /// Number of `update_document` calls so far
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Update { .. }))
            .count()
    }

    /// Make every following call fail with `error` (or recover with `None`)
    pub fn set_outage(&self, error: Option<DocumentStoreError>) {
        if let Ok(mut inner) = self.lock() {
            inner.outage = error;
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn get_now(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if let Some(error) = &inner.outage {
            return Err(error.clone());
        }
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn update_now(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.calls.push(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        });
        if let Some(error) = &inner.outage {
            return Err(error.clone());
        }

        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| DocumentStoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        doc.extend(fields);
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_document(&self, collection: &str, id: &str) -> StoreFuture<Option<Document>> {
        let result = self.get_now(collection, id);
        Box::pin(async move { result })
    }

    fn update_document(&self, collection: &str, id: &str, fields: Document) -> StoreFuture<()> {
        let result = self.update_now(collection, id, fields);
        Box::pin(async move { result })
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore").finish_non_exhaustive()
    }
}
