//! Validation errors shown to the operator.

use crate::payload::PayloadError;
use crate::repository::RepositoryError;
use crate::types::TicketId;
use thiserror::Error;

/// Every way a validation step can fail
///
/// All variants are recoverable; none of them stop the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Decoded text is not a usable payload; scan again
    #[error("{reason}")]
    MalformedScanPayload {
        /// What was wrong, phrased for the operator
        reason: String,
    },

    /// No ticket with this id; scan again
    #[error("Ticket {ticket_id} not found in database.")]
    TicketNotFound {
        /// Id that was looked up
        ticket_id: TicketId,
    },

    /// The ticket was validated before; blocks the commit
    #[error("Ticket {ticket_id} has already been used{}.", by_suffix(.validated_by.as_deref()))]
    AlreadyUsed {
        /// Ticket id
        ticket_id: TicketId,
        /// Who validated it, if recorded
        validated_by: Option<String>,
    },

    /// The ticket service failed; retry manually
    #[error("{message}")]
    TransientServiceError {
        /// What failed, phrased for the operator
        message: String,
    },

    /// The camera failed or was refused; restart the scanner
    #[error("Camera access error: {reason}")]
    CameraAccessError {
        /// Device-reported reason
        reason: String,
    },

    /// Nobody is signed in; the commit needs an operator identity
    #[error("Sign in to validate tickets.")]
    Unauthenticated,
}

fn by_suffix(validated_by: Option<&str>) -> String {
    validated_by.map(|by| format!(" (validated by {by})")).unwrap_or_default()
}

impl From<PayloadError> for ValidationError {
    fn from(error: PayloadError) -> Self {
        Self::MalformedScanPayload {
            reason: error.to_string(),
        }
    }
}

impl ValidationError {
    /// Map a failed lookup
    #[must_use]
    pub fn from_lookup(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(ticket_id) => Self::TicketNotFound { ticket_id },
            other => Self::TransientServiceError {
                message: format!("Failed to load ticket: {other}"),
            },
        }
    }

    /// Map a failed commit
    #[must_use]
    pub fn from_commit(error: &RepositoryError) -> Self {
        Self::TransientServiceError {
            message: format!("Failed to update ticket: {error}"),
        }
    }
}
