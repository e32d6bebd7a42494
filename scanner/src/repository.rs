//! Ticket repository over a document store.
//!
//! Maps documents in the tickets collection to [`Ticket`] values and writes
//! the validation fields back. No retries and no concurrency checks: the
//! update is a plain overwrite of four fields.

use crate::document_store::{Document, DocumentStore, DocumentStoreError};
use crate::types::{Ticket, TicketId, TicketStatus, Validation};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Default collection holding ticket documents
pub const DEFAULT_COLLECTION: &str = "tickets";

/// Result type for repository calls
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Boxed future returned by repository calls
pub type RepositoryFuture<T> = Pin<Box<dyn Future<Output = RepositoryResult<T>> + Send>>;

/// Repository failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No ticket with this id
    #[error("Ticket {0} not found")]
    NotFound(TicketId),

    /// Connectivity or service failure
    #[error("Ticket service unavailable: {0}")]
    Transient(String),

    /// Document exists but cannot be read as a ticket
    #[error("Ticket {id} has an invalid record: {reason}")]
    InvalidRecord {
        /// Ticket id
        id: TicketId,
        /// What was wrong
        reason: String,
    },
}

impl RepositoryError {
    fn from_store(id: &TicketId, error: DocumentStoreError) -> Self {
        match error {
            DocumentStoreError::NotFound { .. } => Self::NotFound(id.clone()),
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Read and write access to tickets
pub trait TicketRepository: Send + Sync {
    /// Load a ticket
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if absent, [`RepositoryError::Transient`]
    /// on connectivity or service failure.
    fn fetch(&self, id: &TicketId) -> RepositoryFuture<Ticket>;

    /// Mark a ticket used
    ///
    /// Unconditionally overwrites status, remarks, validator and timestamp.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Transient`] on connectivity or service failure,
    /// [`RepositoryError::NotFound`] if the document disappeared.
    fn mark_used(
        &self,
        id: &TicketId,
        remarks: &str,
        validated_by: &str,
        validated_at: DateTime<Utc>,
    ) -> RepositoryFuture<()>;
}

/// [`TicketRepository`] backed by one collection of a [`DocumentStore`]
#[derive(Clone)]
pub struct DocumentTicketRepository {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl DocumentTicketRepository {
    /// Create a repository over `collection`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Create an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Arc<dyn TicketRepository> {
        Arc::new(Self::new(store, collection))
    }
}

impl TicketRepository for DocumentTicketRepository {
    fn fetch(&self, id: &TicketId) -> RepositoryFuture<Ticket> {
        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let id = id.clone();

        Box::pin(async move {
            match store.get_document(&collection, id.as_str()).await {
                Ok(Some(document)) => ticket_from_document(id, &document),
                Ok(None) => Err(RepositoryError::NotFound(id)),
                Err(error) => {
                    tracing::error!(ticket_id = %id, %error, "Ticket fetch failed");
                    Err(RepositoryError::from_store(&id, error))
                },
            }
        })
    }

    fn mark_used(
        &self,
        id: &TicketId,
        remarks: &str,
        validated_by: &str,
        validated_at: DateTime<Utc>,
    ) -> RepositoryFuture<()> {
        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let id = id.clone();
        let fields = used_fields(remarks, validated_by, validated_at);

        Box::pin(async move {
            store
                .update_document(&collection, id.as_str(), fields)
                .await
                .map_err(|error| {
                    tracing::error!(ticket_id = %id, %error, "Ticket update failed");
                    RepositoryError::from_store(&id, error)
                })
        })
    }
}

/// The exact field set written when a ticket is validated
fn used_fields(remarks: &str, validated_by: &str, validated_at: DateTime<Utc>) -> Document {
    let mut fields = Document::new();
    fields.insert("status".to_string(), Value::from(TicketStatus::Used.as_str()));
    fields.insert("remarks".to_string(), Value::from(remarks));
    fields.insert("validatedBy".to_string(), Value::from(validated_by));
    fields.insert(
        "validatedAt".to_string(),
        Value::from(validated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    fields
}

/// Map a stored document to a ticket
///
/// A missing `status` reads as issued. Any other unknown status, or a
/// malformed `validatedAt`, makes the record invalid.
fn ticket_from_document(id: TicketId, doc: &Document) -> RepositoryResult<Ticket> {
    let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);
    let invalid = |reason: String| RepositoryError::InvalidRecord {
        id: id.clone(),
        reason,
    };

    let status = match doc.get("status") {
        None | Some(Value::Null) => TicketStatus::Issued,
        Some(Value::String(s)) => s.parse().map_err(invalid)?,
        Some(other) => return Err(invalid(format!("status is not a string: {other}"))),
    };

    let validation = match (text("validatedBy"), text("validatedAt")) {
        (Some(validated_by), Some(at)) => Some(Validation {
            validated_by,
            validated_at: DateTime::parse_from_rfc3339(&at)
                .map_err(|e| invalid(format!("validatedAt '{at}': {e}")))?
                .with_timezone(&Utc),
        }),
        _ => None,
    };

    Ok(Ticket {
        holder_name: text("userName"),
        holder_email: text("userEmail"),
        event_name: text("eventName"),
        event_date: text("eventDate"),
        event_location: text("eventLocation"),
        photo_url: text("photoURL"),
        status,
        remarks: text("remarks"),
        validation,
        id,
    })
}
