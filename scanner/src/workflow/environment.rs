//! Workflow dependencies.

use crate::decoder::QrDecoder;
use crate::repository::TicketRepository;
use crate::session::SessionHandle;
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::environment::Clock;

/// Remarks recorded when the operator leaves them blank
pub const DEFAULT_REMARKS: &str = "No remarks";

/// Tunables for the workflow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Stored when the operator enters no remarks
    pub default_remarks: String,
    /// Keep the success message on screen this long before resetting
    pub commit_reset_delay: Option<Duration>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_remarks: DEFAULT_REMARKS.to_string(),
            commit_reset_delay: None,
        }
    }
}

/// Environment dependencies for the workflow reducer
#[derive(Clone)]
pub struct WorkflowEnvironment {
    /// Clock for validation timestamps
    pub clock: Arc<dyn Clock>,
    /// Ticket reads and writes
    pub repository: Arc<dyn TicketRepository>,
    /// QR source
    pub decoder: Arc<dyn QrDecoder>,
    /// Who is signed in
    pub session: SessionHandle,
    /// Tunables
    pub settings: WorkflowSettings,
}

impl WorkflowEnvironment {
    /// Creates a new `WorkflowEnvironment` with default settings
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        repository: Arc<dyn TicketRepository>,
        decoder: Arc<dyn QrDecoder>,
        session: SessionHandle,
    ) -> Self {
        Self {
            clock,
            repository,
            decoder,
            session,
            settings: WorkflowSettings::default(),
        }
    }

    /// Replace the settings
    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }
}
