//! Workflow state.

use super::error::ValidationError;
use crate::types::{ScanOverlay, Ticket, TicketDetails};
use std::fmt;

/// Where the workflow is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Scanner off, nothing loaded
    #[default]
    Idle,
    /// Scanner on, waiting for a code
    Scanning,
    /// A code was read; the ticket is being fetched
    Resolving,
    /// Ticket loaded and shown to the operator
    Review,
    /// The used-mark is being written
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Resolving => "resolving",
            Self::Review => "review",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Tone of an operator message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackStatus {
    /// Something worked
    Success,
    /// Something failed; see the message
    Error,
}

/// Status/message pair shown to the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feedback {
    /// Tone
    pub status: FeedbackStatus,
    /// Text
    pub message: String,
}

impl Feedback {
    /// Success message
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Success,
            message: message.into(),
        }
    }

    /// Error message
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: FeedbackStatus::Error,
            message: message.into(),
        }
    }

    /// Whether this reports a failure
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == FeedbackStatus::Error
    }
}

/// Identifies one lookup or commit
///
/// Bumped whenever an operation starts or the workflow is reset, so a result
/// carrying an older flight belongs to work the operator already left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlightId(u64);

impl FlightId {
    /// The following flight
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the workflow knows during one operator session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkflowState {
    /// Current phase
    pub phase: Phase,
    /// Last message shown to the operator
    pub feedback: Option<Feedback>,
    /// Ticket as read from the store (Review and Committing only)
    pub ticket: Option<Ticket>,
    /// QR hints for the loaded ticket
    pub overlay: ScanOverlay,
    /// Remarks being entered for the commit
    pub remarks: String,
    /// Last validation error (if any)
    pub last_error: Option<ValidationError>,
    /// Current flight
    pub flight: FlightId,
}

impl WorkflowState {
    /// Creates a new idle state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder subscription is (or should be) running
    #[must_use]
    pub const fn is_scanner_active(&self) -> bool {
        matches!(self.phase, Phase::Scanning | Phase::Resolving)
    }

    /// Merged view of the loaded ticket
    #[must_use]
    pub fn details(&self) -> Option<TicketDetails> {
        self.ticket
            .as_ref()
            .map(|ticket| TicketDetails::merge(ticket, &self.overlay))
    }

    /// Drop the loaded ticket and pending input
    pub(crate) fn clear_ticket(&mut self) {
        self.ticket = None;
        self.overlay = ScanOverlay::default();
        self.remarks.clear();
    }

    /// Start a new flight and return it
    pub(crate) fn begin_flight(&mut self) -> FlightId {
        self.flight = self.flight.next();
        self.flight
    }

    pub(crate) fn succeed(&mut self, message: impl Into<String>) {
        self.feedback = Some(Feedback::success(message));
        self.last_error = None;
    }

    pub(crate) fn fail(&mut self, error: ValidationError) {
        self.feedback = Some(Feedback::error(error.to_string()));
        self.last_error = Some(error);
    }
}
