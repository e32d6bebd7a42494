//! Turnstile - scan-to-validation workflow for event tickets
//!
//! A door operator signs in, points a scanner at a ticket's QR code, reviews
//! the ticket loaded from the ticket store, and marks it used.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   frames    ┌──────────────────────────────┐   fetch / markUsed   ┌────────────────┐
//! │   Decoder    │ ──────────▶ │  WorkflowStore               │ ───────────────────▶ │TicketRepository│
//! │  (channel,   │  (stream    │  WorkflowReducer + state     │                      │ DocumentStore  │
//! │   line)      │   effect)   │  Idle/Scanning/Resolving/    │ ◀─────────────────── │ (http, memory) │
//! └──────────────┘             │  Review/Committing           │    results (flight)  └────────────────┘
//!                              └──────────────────────────────┘
//!                                         ▲
//!                                         │ admit / identity
//!                              ┌──────────────────────────────┐
//!                              │  SessionBoundary             │
//!                              └──────────────────────────────┘
//! ```
//!
//! # Key Guarantees
//!
//! - A ticket is never marked used without an explicit operator commit.
//! - A ticket already used is never re-marked by this workflow.
//! - Malformed QR payloads never reach the ticket store.
//! - The decoder subscription is released whenever the scanner is not
//!   `Scanning` or `Resolving`.
//!
//! # Modules
//!
//! - [`types`]: tickets, identifiers, the merged display model
//! - [`payload`]: QR text interpretation
//! - [`document_store`] / [`repository`]: ticket persistence
//! - [`decoder`]: frame sources
//! - [`session`]: operator session gate
//! - [`workflow`]: the state machine
//! - [`config`] / [`console`]: the operator console binary's plumbing

pub mod config;
pub mod console;
pub mod decoder;
pub mod document_store;
pub mod payload;
pub mod repository;
pub mod session;
pub mod types;
pub mod workflow;

pub use config::Config;
pub use decoder::{ChannelDecoder, DecoderEvent, FrameFeed, LineDecoder, QrDecoder};
pub use repository::{DocumentTicketRepository, RepositoryError, TicketRepository};
pub use session::{SessionBoundary, SessionHandle, SessionPhase};
pub use types::{Identity, Ticket, TicketDetails, TicketId, TicketStatus};
pub use workflow::{
    Phase, ValidationError, WorkflowAction, WorkflowEnvironment, WorkflowReducer, WorkflowState,
    WorkflowStore,
};
