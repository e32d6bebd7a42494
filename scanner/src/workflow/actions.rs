//! Workflow actions.

use super::state::FlightId;
use crate::decoder::{DecoderEvent, ScanEvent};
use crate::repository::RepositoryError;
use crate::types::Ticket;

/// Everything the workflow reacts to
///
/// Operator commands, decoder events, and service results. Service results
/// carry the flight they were started under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowAction {
    // ========== Operator commands ==========
    /// Turn the scanner on
    OpenScanner,
    /// Turn the scanner off
    CloseScanner,
    /// Replace the pending remarks
    EditRemarks {
        /// New remarks text
        remarks: String,
    },
    /// Mark the loaded ticket used
    Commit,
    /// Discard the loaded ticket without writing
    Cancel,

    // ========== Decoder events ==========
    /// A frame decoded to text
    Decoded {
        /// The decoded frame
        scan: ScanEvent,
    },
    /// A frame could not be decoded
    FrameUnreadable {
        /// Decoder-reported reason
        reason: String,
    },
    /// The camera failed or was refused
    CameraFailed {
        /// Decoder-reported reason
        reason: String,
    },

    // ========== Service results ==========
    /// Lookup finished
    TicketLoaded {
        /// Flight the lookup ran under
        flight: FlightId,
        /// Stored record
        ticket: Ticket,
    },
    /// Lookup failed
    LookupFailed {
        /// Flight the lookup ran under
        flight: FlightId,
        /// Cause
        error: RepositoryError,
    },
    /// Used-mark written
    CommitSucceeded {
        /// Flight the commit ran under
        flight: FlightId,
    },
    /// Used-mark failed
    CommitFailed {
        /// Flight the commit ran under
        flight: FlightId,
        /// Cause
        error: RepositoryError,
    },
    /// Post-commit display delay elapsed
    ResetAfterCommit {
        /// Flight of the commit being shown
        flight: FlightId,
    },
}

impl From<DecoderEvent> for WorkflowAction {
    fn from(event: DecoderEvent) -> Self {
        match event {
            DecoderEvent::Decoded(scan) => Self::Decoded { scan },
            DecoderEvent::FrameUnreadable(reason) => Self::FrameUnreadable { reason },
            DecoderEvent::CameraFailed(reason) => Self::CameraFailed { reason },
        }
    }
}

impl WorkflowAction {
    /// Whether the operator issued this (as opposed to a device or service)
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::OpenScanner
                | Self::CloseScanner
                | Self::EditRemarks { .. }
                | Self::Commit
                | Self::Cancel
        )
    }
}
