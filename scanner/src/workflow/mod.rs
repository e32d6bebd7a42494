//! Scan-to-validation workflow.
//!
//! ```text
//! Idle ─open─▶ Scanning ─decoded─▶ Resolving ─loaded─▶ Review ─commit─▶ Committing ─ok─▶ Idle
//!                 ▲                    │                  │                  │
//!                 └──── lookup failed ─┘                  └─ cancel ▶ Idle   └─ failed ▶ Review
//! ```
//!
//! All state lives in one [`WorkflowState`] value, changed only by
//! [`WorkflowReducer`]. Device and service calls are effects; their results
//! come back as actions tagged with the [`FlightId`] they were started under,
//! and results for a superseded flight are dropped.

mod actions;
mod environment;
mod error;
mod reducer;
mod state;

pub use actions::WorkflowAction;
pub use environment::{WorkflowEnvironment, WorkflowSettings, DEFAULT_REMARKS};
pub use error::ValidationError;
pub use reducer::{WorkflowReducer, SCANNER};
pub use state::{Feedback, FeedbackStatus, FlightId, Phase, WorkflowState};

/// Store type running the workflow
pub type WorkflowStore = turnstile_runtime::Store<
    WorkflowState,
    WorkflowAction,
    WorkflowEnvironment,
    WorkflowReducer,
>;
