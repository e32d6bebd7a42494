//! Configuration management for the operator console.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::document_store::{
    DocumentStore, DocumentStoreError, HttpDocumentStore, InMemoryDocumentStore,
};
use crate::repository::DEFAULT_COLLECTION;
use crate::types::Identity;
use crate::workflow::{WorkflowSettings, DEFAULT_REMARKS};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ticket storage
    pub document_store: DocumentStoreConfig,
    /// Signed-in operator
    pub operator: OperatorConfig,
    /// Workflow tunables
    pub workflow: WorkflowConfig,
    /// Console process settings
    pub console: ConsoleConfig,
}

/// Document store configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Base URL of the remote store; in-memory when unset
    pub url: Option<String>,
    /// Bearer token for the remote store
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Collection holding tickets
    pub collection: String,
    /// JSON file seeding the in-memory store
    pub seed_file: Option<PathBuf>,
}

impl std::fmt::Debug for DocumentStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStoreConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("collection", &self.collection)
            .field("seed_file", &self.seed_file)
            .finish()
    }
}

/// Operator identity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Provider subject id
    pub id: Option<String>,
    /// Operator email
    pub email: Option<String>,
}

/// Workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Remarks stored when the operator enters none
    pub default_remarks: String,
    /// Milliseconds to keep the commit result on screen (0 = reset at once)
    pub commit_reset_delay_ms: u64,
}

/// Console process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Keyboard-wedge scanner device or file; frames come from `scan` commands when unset
    pub scanner_input: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// Blank values count as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            document_store: DocumentStoreConfig {
                url: var("DOCUMENT_STORE_URL"),
                token: var("DOCUMENT_STORE_TOKEN"),
                timeout: number("DOCUMENT_STORE_TIMEOUT", 30),
                collection: var("TICKETS_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                seed_file: var("TICKETS_SEED_FILE").map(PathBuf::from),
            },
            operator: OperatorConfig {
                id: var("OPERATOR_ID"),
                email: var("OPERATOR_EMAIL"),
            },
            workflow: WorkflowConfig {
                default_remarks: var("DEFAULT_REMARKS")
                    .unwrap_or_else(|| DEFAULT_REMARKS.to_string()),
                commit_reset_delay_ms: number("COMMIT_RESET_DELAY_MS", 0),
            },
            console: ConsoleConfig {
                shutdown_timeout: number("SHUTDOWN_TIMEOUT", 5),
                scanner_input: var("SCANNER_INPUT").map(PathBuf::from),
            },
        }
    }

    /// Build the configured document store
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError`] if the store URL is invalid, the HTTP
    /// client cannot be built, or the seed file cannot be loaded.
    pub fn build_document_store(&self) -> Result<Arc<dyn DocumentStore>, DocumentStoreError> {
        let cfg = &self.document_store;

        if let Some(url) = &cfg.url {
            tracing::info!(url = %url, "Using remote document store");
            let store = HttpDocumentStore::new(
                url.clone(),
                cfg.token.clone(),
                Duration::from_secs(cfg.timeout),
            )?;
            return Ok(Arc::new(store));
        }

        let store = InMemoryDocumentStore::new();
        if let Some(path) = &cfg.seed_file {
            let count = store.seed_file(&cfg.collection, path)?;
            tracing::info!(path = %path.display(), count, "Seeded in-memory document store");
        } else {
            tracing::warn!("No document store configured; using an empty in-memory store");
        }
        Ok(Arc::new(store))
    }

    /// Operator identity, if one is configured
    ///
    /// The subject falls back to the email when only an email is given.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        let OperatorConfig { id, email } = &self.operator;
        let subject = id.clone().or_else(|| email.clone())?;
        Some(Identity {
            subject,
            email: email.clone(),
        })
    }

    /// Workflow settings
    #[must_use]
    pub fn workflow_settings(&self) -> WorkflowSettings {
        let delay = self.workflow.commit_reset_delay_ms;
        WorkflowSettings {
            default_remarks: self.workflow.default_remarks.clone(),
            commit_reset_delay: (delay > 0).then(|| Duration::from_millis(delay)),
        }
    }

    /// Graceful shutdown timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.console.shutdown_timeout)
    }
}
