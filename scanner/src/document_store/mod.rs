//! Document store abstraction.
//!
//! The ticket collection lives in an external document database. This module
//! only knows documents as JSON field maps; the [`crate::repository`] layer
//! maps them to tickets.

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpDocumentStore;
pub use memory::InMemoryDocumentStore;

/// A document's fields
pub type Document = Map<String, Value>;

/// Result type for document store calls
pub type StoreResult<T> = Result<T, DocumentStoreError>;

/// Boxed future returned by document store calls
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send>>;

/// Errors reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentStoreError {
    /// Request could not be sent or did not complete
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Store refused the credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Update addressed a document that does not exist
    #[error("Document {collection}/{id} not found")]
    NotFound {
        /// Collection name
        collection: String,
        /// Document id
        id: String,
    },

    /// Store answered with an unexpected status
    #[error("Store error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Response body was not a JSON object
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Store is not reachable (mock outage, poisoned state)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Plain request/response access to a document collection
///
/// Implementations never retry.
pub trait DocumentStore: Send + Sync {
    /// Read a document; `Ok(None)` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError`] on connectivity or service failure.
    fn get_document(&self, collection: &str, id: &str) -> StoreFuture<Option<Document>>;

    /// Overwrite the given fields of an existing document
    ///
    /// Fields not named in `fields` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] when the document is absent,
    /// or another variant on connectivity or service failure.
    fn update_document(&self, collection: &str, id: &str, fields: Document) -> StoreFuture<()>;
}
