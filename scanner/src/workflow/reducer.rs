//! Reducer for the validation workflow.
//!
//! Each handler checks the phase first. Commands issued in the wrong phase
//! and results for a superseded flight are logged and dropped without
//! touching state.

use super::actions::WorkflowAction;
use super::environment::WorkflowEnvironment;
use super::error::ValidationError;
use super::state::{FlightId, Phase, WorkflowState};
use crate::decoder::{DecoderEvent, ScanEvent};
use crate::payload::ScanPayload;
use crate::repository::RepositoryError;
use crate::types::Ticket;
use futures::StreamExt;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;
use turnstile_core::{
    async_effect, delay,
    effect::{Effect, EffectId},
    reducer::Reducer,
};

/// Cancellation id of the decoder subscription
pub const SCANNER: EffectId = EffectId::new("scanner");

type Effects = SmallVec<[Effect<WorkflowAction>; 4]>;

/// Reducer for the validation workflow
#[derive(Clone, Debug, Default)]
pub struct WorkflowReducer;

impl WorkflowReducer {
    /// Creates a new `WorkflowReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn ignore(state: &WorkflowState, action: &'static str) -> Effects {
        tracing::warn!(phase = %state.phase, action, "Action not valid in this phase, ignored");
        metrics::counter!("workflow.actions.rejected", "action" => action).increment(1);
        SmallVec::new()
    }

    fn stale(state: &WorkflowState, action: &'static str, flight: FlightId) -> Effects {
        tracing::warn!(
            phase = %state.phase,
            current = %state.flight,
            result = %flight,
            action,
            "Discarding result for a superseded flight"
        );
        metrics::counter!("workflow.results.stale", "action" => action).increment(1);
        SmallVec::new()
    }

    fn is_current(state: &WorkflowState, expected: Phase, flight: FlightId) -> bool {
        state.phase == expected && state.flight == flight
    }

    fn transition(state: &mut WorkflowState, to: Phase) {
        tracing::debug!(from = %state.phase, to = %to, flight = %state.flight, "Workflow transition");
        state.phase = to;
    }

    // ========== Scanner ==========

    fn open_scanner(state: &mut WorkflowState, env: &WorkflowEnvironment) -> Effects {
        if state.phase != Phase::Idle {
            return Self::ignore(state, "open_scanner");
        }

        Self::transition(state, Phase::Scanning);
        state.feedback = None;
        state.last_error = None;
        metrics::counter!("workflow.scanner.opened").increment(1);

        let decoder = Arc::clone(&env.decoder);
        let frames = async_stream::stream! {
            match decoder.start().await {
                Ok(mut frames) => {
                    let mut failed = false;
                    while let Some(event) = frames.next().await {
                        failed = matches!(event, DecoderEvent::CameraFailed(_));
                        yield WorkflowAction::from(event);
                    }
                    // A source that runs dry cannot deliver more frames
                    if !failed {
                        tracing::warn!("Scanner input ended");
                        yield WorkflowAction::CameraFailed {
                            reason: "scanner input ended".to_string(),
                        };
                    }
                },
                Err(error) => {
                    tracing::error!(%error, "Scanner failed to start");
                    yield WorkflowAction::CameraFailed { reason: error.to_string() };
                },
            }
        };

        smallvec![Effect::Stream(Box::pin(frames)).cancellable(SCANNER)]
    }

    fn close_scanner(state: &mut WorkflowState) -> Effects {
        if !state.is_scanner_active() {
            return Self::ignore(state, "close_scanner");
        }

        // A lookup still running belongs to the session being closed
        state.begin_flight();
        state.clear_ticket();
        Self::transition(state, Phase::Idle);

        smallvec![Effect::Cancel(SCANNER)]
    }

    fn decoded(state: &mut WorkflowState, scan: ScanEvent, env: &WorkflowEnvironment) -> Effects {
        match state.phase {
            Phase::Scanning => {},
            Phase::Idle => {
                tracing::debug!("Decode arrived after the scanner closed, ignored");
                metrics::counter!("workflow.scans.stale").increment(1);
                return SmallVec::new();
            },
            Phase::Resolving | Phase::Review | Phase::Committing => {
                tracing::warn!(phase = %state.phase, "Scan rejected: a ticket is already in flight");
                metrics::counter!("workflow.scans.rejected").increment(1);
                return SmallVec::new();
            },
        }

        metrics::counter!("workflow.scans.total").increment(1);

        let payload = match ScanPayload::parse(&scan.payload) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "Malformed scan payload");
                state.fail(error.into());
                return SmallVec::new();
            },
        };

        let flight = state.begin_flight();
        Self::transition(state, Phase::Resolving);
        state.overlay = payload.overlay;
        state.feedback = None;
        state.last_error = None;

        let repository = Arc::clone(&env.repository);
        let ticket_id = payload.ticket_id;
        tracing::debug!(%ticket_id, %flight, "Looking up ticket");

        smallvec![async_effect! {
            match repository.fetch(&ticket_id).await {
                Ok(ticket) => Some(WorkflowAction::TicketLoaded { flight, ticket }),
                Err(error) => Some(WorkflowAction::LookupFailed { flight, error }),
            }
        }]
    }

    fn frame_unreadable(state: &mut WorkflowState, reason: String) -> Effects {
        if state.phase != Phase::Scanning {
            tracing::debug!(phase = %state.phase, %reason, "Unreadable frame ignored");
            return SmallVec::new();
        }

        state.fail(ValidationError::MalformedScanPayload {
            reason: format!("Unreadable QR frame: {reason}"),
        });
        SmallVec::new()
    }

    fn camera_failed(state: &mut WorkflowState, reason: String) -> Effects {
        if !state.is_scanner_active() {
            return Self::ignore(state, "camera_failed");
        }

        tracing::error!(%reason, "Camera failure, scanner stopped");
        metrics::counter!("workflow.camera.failures").increment(1);

        state.begin_flight();
        state.clear_ticket();
        Self::transition(state, Phase::Idle);
        state.fail(ValidationError::CameraAccessError { reason });

        smallvec![Effect::Cancel(SCANNER)]
    }

    // ========== Lookup ==========

    fn ticket_loaded(state: &mut WorkflowState, flight: FlightId, ticket: Ticket) -> Effects {
        if !Self::is_current(state, Phase::Resolving, flight) {
            return Self::stale(state, "ticket_loaded", flight);
        }

        tracing::info!(ticket_id = %ticket.id, status = %ticket.status, "Ticket loaded");
        Self::transition(state, Phase::Review);
        state.ticket = Some(ticket);
        state.remarks.clear();
        state.succeed("Ticket scanned successfully.");

        // One read per session: release the camera
        smallvec![Effect::Cancel(SCANNER)]
    }

    fn lookup_failed(state: &mut WorkflowState, flight: FlightId, error: RepositoryError) -> Effects {
        if !Self::is_current(state, Phase::Resolving, flight) {
            return Self::stale(state, "lookup_failed", flight);
        }

        tracing::warn!(%error, "Ticket lookup failed");
        Self::transition(state, Phase::Scanning);
        state.clear_ticket();
        state.fail(ValidationError::from_lookup(error));
        SmallVec::new()
    }

    // ========== Review ==========

    fn edit_remarks(state: &mut WorkflowState, remarks: String) -> Effects {
        if state.phase != Phase::Review {
            return Self::ignore(state, "edit_remarks");
        }

        state.remarks = remarks;
        SmallVec::new()
    }

    fn cancel(state: &mut WorkflowState) -> Effects {
        match state.phase {
            Phase::Review => {
                state.begin_flight();
                state.clear_ticket();
                state.feedback = None;
                state.last_error = None;
                Self::transition(state, Phase::Idle);
                SmallVec::new()
            },
            Phase::Scanning | Phase::Resolving => Self::close_scanner(state),
            Phase::Idle | Phase::Committing => Self::ignore(state, "cancel"),
        }
    }

    fn commit(state: &mut WorkflowState, env: &WorkflowEnvironment) -> Effects {
        if state.phase == Phase::Committing {
            tracing::debug!("Commit already in flight, ignored");
            return SmallVec::new();
        }
        if state.phase != Phase::Review {
            return Self::ignore(state, "commit");
        }
        let Some(ticket) = state.ticket.as_ref() else {
            return Self::ignore(state, "commit");
        };

        if ticket.is_used() {
            let error = ValidationError::AlreadyUsed {
                ticket_id: ticket.id.clone(),
                validated_by: ticket.validation.as_ref().map(|v| v.validated_by.clone()),
            };
            tracing::warn!(ticket_id = %ticket.id, "Commit rejected: ticket already used");
            metrics::counter!("workflow.commits.rejected").increment(1);
            state.fail(error);
            return SmallVec::new();
        }

        let Some(identity) = env.session.current_identity() else {
            tracing::warn!("Commit rejected: no operator signed in");
            state.fail(ValidationError::Unauthenticated);
            return SmallVec::new();
        };

        let ticket_id = ticket.id.clone();
        let remarks = match state.remarks.trim() {
            "" => env.settings.default_remarks.clone(),
            text => text.to_string(),
        };
        let validated_by = identity.label().to_string();
        let validated_at = env.clock.now();

        let flight = state.begin_flight();
        Self::transition(state, Phase::Committing);
        metrics::counter!("workflow.commits.total").increment(1);
        tracing::info!(%ticket_id, %validated_by, %flight, "Marking ticket used");

        let repository = Arc::clone(&env.repository);
        smallvec![async_effect! {
            match repository
                .mark_used(&ticket_id, &remarks, &validated_by, validated_at)
                .await
            {
                Ok(()) => Some(WorkflowAction::CommitSucceeded { flight }),
                Err(error) => Some(WorkflowAction::CommitFailed { flight, error }),
            }
        }]
    }

    // ========== Commit results ==========

    fn commit_succeeded(
        state: &mut WorkflowState,
        flight: FlightId,
        env: &WorkflowEnvironment,
    ) -> Effects {
        if !Self::is_current(state, Phase::Committing, flight) {
            return Self::stale(state, "commit_succeeded", flight);
        }

        state.succeed("Ticket marked as used.");

        match env.settings.commit_reset_delay.filter(|d| !d.is_zero()) {
            Some(duration) => smallvec![delay! {
                duration: duration,
                action: WorkflowAction::ResetAfterCommit { flight }
            }],
            None => {
                state.clear_ticket();
                Self::transition(state, Phase::Idle);
                SmallVec::new()
            },
        }
    }

    fn commit_failed(state: &mut WorkflowState, flight: FlightId, error: &RepositoryError) -> Effects {
        if !Self::is_current(state, Phase::Committing, flight) {
            return Self::stale(state, "commit_failed", flight);
        }

        tracing::error!(%error, "Marking ticket used failed");
        Self::transition(state, Phase::Review);
        state.fail(ValidationError::from_commit(error));
        SmallVec::new()
    }

    fn reset_after_commit(state: &mut WorkflowState, flight: FlightId) -> Effects {
        if !Self::is_current(state, Phase::Committing, flight) {
            return Self::stale(state, "reset_after_commit", flight);
        }

        state.clear_ticket();
        Self::transition(state, Phase::Idle);
        SmallVec::new()
    }
}

impl Reducer for WorkflowReducer {
    type State = WorkflowState;
    type Action = WorkflowAction;
    type Environment = WorkflowEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            metrics::counter!("store.commands.total").increment(1);
        }

        match action {
            // ========== Operator commands ==========
            WorkflowAction::OpenScanner => Self::open_scanner(state, env),
            WorkflowAction::CloseScanner => Self::close_scanner(state),
            WorkflowAction::EditRemarks { remarks } => Self::edit_remarks(state, remarks),
            WorkflowAction::Commit => Self::commit(state, env),
            WorkflowAction::Cancel => Self::cancel(state),

            // ========== Decoder events ==========
            WorkflowAction::Decoded { scan } => Self::decoded(state, scan, env),
            WorkflowAction::FrameUnreadable { reason } => Self::frame_unreadable(state, reason),
            WorkflowAction::CameraFailed { reason } => Self::camera_failed(state, reason),

            // ========== Service results ==========
            WorkflowAction::TicketLoaded { flight, ticket } => {
                Self::ticket_loaded(state, flight, ticket)
            },
            WorkflowAction::LookupFailed { flight, error } => {
                Self::lookup_failed(state, flight, error)
            },
            WorkflowAction::CommitSucceeded { flight } => {
                Self::commit_succeeded(state, flight, env)
            },
            WorkflowAction::CommitFailed { flight, error } => {
                Self::commit_failed(state, flight, &error)
            },
            WorkflowAction::ResetAfterCommit { flight } => Self::reset_after_commit(state, flight),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code
mod tests {
    use super::*;
    use crate::decoder::ChannelDecoder;
    use crate::document_store::{DocumentStore, InMemoryDocumentStore};
    use crate::repository::DocumentTicketRepository;
    use crate::session::SessionHandle;
    use crate::types::{Identity, TicketId, TicketStatus, Validation};
    use crate::workflow::{FeedbackStatus, WorkflowSettings};
    use serde_json::json;
    use std::time::Duration;
    use turnstile_core::environment::Clock;
    use turnstile_testing::{assertions, test_clock, ReducerTest};

    fn operator() -> Identity {
        Identity {
            subject: "uid-7".to_string(),
            email: Some("gate@example.com".to_string()),
        }
    }

    fn store() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        store
            .seed_json(
                "tickets",
                r#"{
                    "T-101": { "userName": "Ada", "eventName": "Launch", "status": "issued" },
                    "T-102": { "userName": "Grace", "status": "used",
                               "validatedBy": "door@example.com",
                               "validatedAt": "2024-12-31T23:00:00Z" }
                }"#,
            )
            .unwrap();
        store
    }

    fn env_with(store: &InMemoryDocumentStore, identity: Option<Identity>) -> WorkflowEnvironment {
        let clock = Arc::new(test_clock());
        let (decoder, _feed) = ChannelDecoder::new(clock.clone());
        WorkflowEnvironment::new(
            clock,
            DocumentTicketRepository::shared(Arc::new(store.clone()), "tickets"),
            Arc::new(decoder),
            SessionHandle::fixed(identity),
        )
    }

    fn test_env() -> WorkflowEnvironment {
        env_with(&store(), Some(operator()))
    }

    fn id(s: &str) -> TicketId {
        s.parse().unwrap()
    }

    fn scan(payload: &str) -> WorkflowAction {
        WorkflowAction::Decoded {
            scan: ScanEvent {
                payload: payload.to_string(),
                received_at: test_clock().now(),
            },
        }
    }

    fn issued(s: &str) -> Ticket {
        let mut ticket = Ticket::issued(id(s));
        ticket.holder_name = Some("Ada".to_string());
        ticket
    }

    fn scanning() -> WorkflowState {
        WorkflowState {
            phase: Phase::Scanning,
            ..WorkflowState::default()
        }
    }

    fn review(ticket: Ticket) -> WorkflowState {
        WorkflowState {
            phase: Phase::Review,
            ticket: Some(ticket),
            flight: FlightId::default().next(),
            ..WorkflowState::default()
        }
    }

    async fn run_future(effects: Effects) -> Option<WorkflowAction> {
        match effects.into_iter().next() {
            Some(Effect::Future(fut)) => fut.await,
            other => panic!("expected a future effect, got {other:?}"),
        }
    }

    // ========== Scanner ==========

    #[test]
    fn test_open_scanner_subscribes_to_decoder() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(WorkflowState::new())
            .when_action(WorkflowAction::OpenScanner)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Scanning);
                assert!(state.is_scanner_active());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_cancellable_stream(effects, &SCANNER);
            })
            .run();
    }

    #[test]
    fn test_open_scanner_twice_is_ignored() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(WorkflowAction::OpenScanner)
            .then_state(|state| assert_eq!(state.phase, Phase::Scanning))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_close_scanner_cancels_subscription() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(WorkflowAction::CloseScanner)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(!state.is_scanner_active());
            })
            .then_effects(|effects| assertions::assert_has_cancel(effects, &SCANNER))
            .run();
    }

    #[test]
    fn test_decode_after_close_is_ignored() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([WorkflowAction::CloseScanner, scan("T-101")])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(state.ticket.is_none());
                assert!(state.feedback.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_camera_failure_stops_scanner() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(WorkflowAction::CameraFailed {
                reason: "permission denied".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(matches!(
                    state.last_error,
                    Some(ValidationError::CameraAccessError { .. })
                ));
                assert!(state.feedback.as_ref().unwrap().message.contains("permission denied"));
            })
            .then_effects(|effects| assertions::assert_has_cancel(effects, &SCANNER))
            .run();
    }

    #[test]
    fn test_unreadable_frame_keeps_scanning() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(WorkflowAction::FrameUnreadable {
                reason: "blurry".to_string(),
            })
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Scanning);
                assert!(state.feedback.as_ref().unwrap().is_error());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    // ========== Decoding ==========

    #[test]
    fn test_valid_scan_starts_lookup() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(scan(r#"{"ticketId":"T-101","photoURL":"https://example.com/a.png"}"#))
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Resolving);
                assert_eq!(state.flight, FlightId::default().next());
                assert_eq!(
                    state.overlay.photo_url.as_deref(),
                    Some("https://example.com/a.png")
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_malformed_scan_never_fetches() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(scan("{bad json"))
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Scanning);
                assert_eq!(state.flight, FlightId::default());
                assert!(matches!(
                    state.last_error,
                    Some(ValidationError::MalformedScanPayload { .. })
                ));
                assert_eq!(state.feedback.as_ref().unwrap().status, FeedbackStatus::Error);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_scan_while_resolving_is_rejected() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([scan("T-101"), scan("T-102")])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Resolving);
                assert_eq!(state.flight, FlightId::default().next());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn test_lookup_effect_fetches_stored_ticket() {
        let env = test_env();
        let mut state = scanning();

        let effects = WorkflowReducer::new().reduce(&mut state, scan("T-101"), &env);
        let action = run_future(effects).await.unwrap();

        match action {
            WorkflowAction::TicketLoaded { flight, ticket } => {
                assert_eq!(flight, state.flight);
                assert_eq!(ticket.id, id("T-101"));
                assert_eq!(ticket.event_name.as_deref(), Some("Launch"));
            },
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_effect_reports_absent_ticket() {
        let env = test_env();
        let mut state = scanning();

        let effects = WorkflowReducer::new().reduce(&mut state, scan("T-100"), &env);
        let action = run_future(effects).await.unwrap();

        assert_eq!(
            action,
            WorkflowAction::LookupFailed {
                flight: state.flight,
                error: RepositoryError::NotFound(id("T-100")),
            }
        );
    }

    // ========== Lookup results ==========

    #[test]
    fn test_ticket_loaded_opens_review() {
        let flight = FlightId::default().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([
                scan(r#"{"ticketId":"T-101","eventLocation":"Hall B"}"#),
                WorkflowAction::TicketLoaded {
                    flight,
                    ticket: issued("T-101"),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Review);
                assert_eq!(state.ticket, Some(issued("T-101")));
                let details = state.details().unwrap();
                assert_eq!(details.holder_name.as_deref(), Some("Ada"));
                assert_eq!(details.event_location.as_deref(), Some("Hall B"));
                assert_eq!(
                    state.feedback.as_ref().unwrap().message,
                    "Ticket scanned successfully."
                );
            })
            .then_effects(|effects| assertions::assert_has_cancel(effects, &SCANNER))
            .run();
    }

    #[test]
    fn test_not_found_returns_to_scanning() {
        let flight = FlightId::default().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([
                scan("T-100"),
                WorkflowAction::LookupFailed {
                    flight,
                    error: RepositoryError::NotFound(id("T-100")),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Scanning);
                assert!(state.ticket.is_none());
                let feedback = state.feedback.as_ref().unwrap();
                assert!(feedback.is_error());
                assert!(feedback.message.contains("not found"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_transient_lookup_failure_returns_to_scanning() {
        let flight = FlightId::default().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([
                scan("T-101"),
                WorkflowAction::LookupFailed {
                    flight,
                    error: RepositoryError::Transient("timeout".to_string()),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Scanning);
                assert!(matches!(
                    state.last_error,
                    Some(ValidationError::TransientServiceError { .. })
                ));
            })
            .run();
    }

    #[test]
    fn test_lookup_result_after_close_is_discarded() {
        let flight = FlightId::default().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_actions([
                scan("T-101"),
                WorkflowAction::CloseScanner,
                WorkflowAction::TicketLoaded {
                    flight,
                    ticket: issued("T-101"),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(state.ticket.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    // ========== Review ==========

    #[test]
    fn test_edit_remarks_only_in_review() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_action(WorkflowAction::EditRemarks {
                remarks: "VIP".to_string(),
            })
            .then_state(|state| assert_eq!(state.remarks, "VIP"))
            .run();

        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(scanning())
            .when_action(WorkflowAction::EditRemarks {
                remarks: "VIP".to_string(),
            })
            .then_state(|state| assert!(state.remarks.is_empty()))
            .run();
    }

    #[test]
    fn test_cancel_clears_without_writing() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::EditRemarks {
                    remarks: "VIP".to_string(),
                },
                WorkflowAction::Cancel,
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(state.ticket.is_none());
                assert!(state.remarks.is_empty());
                assert!(state.feedback.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_commit_used_ticket_is_rejected() {
        let mut used = issued("T-102");
        used.status = TicketStatus::Used;
        used.validation = Some(Validation {
            validated_by: "door@example.com".to_string(),
            validated_at: test_clock().now(),
        });

        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(used))
            .when_action(WorkflowAction::Commit)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Review);
                assert_eq!(
                    state.last_error,
                    Some(ValidationError::AlreadyUsed {
                        ticket_id: id("T-102"),
                        validated_by: Some("door@example.com".to_string()),
                    })
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_commit_requires_identity() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(env_with(&store(), None))
            .given_state(review(issued("T-101")))
            .when_action(WorkflowAction::Commit)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Review);
                assert_eq!(state.last_error, Some(ValidationError::Unauthenticated));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_second_commit_while_committing_is_ignored() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_actions([WorkflowAction::Commit, WorkflowAction::Commit])
            .then_state(|state| assert_eq!(state.phase, Phase::Committing))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn test_commit_writes_default_remarks() {
        let store = store();
        let env = env_with(&store, Some(operator()));
        let mut state = review(issued("T-101"));

        WorkflowReducer::new().reduce(
            &mut state,
            WorkflowAction::EditRemarks {
                remarks: "   ".to_string(),
            },
            &env,
        );
        let effects = WorkflowReducer::new().reduce(&mut state, WorkflowAction::Commit, &env);
        assert_eq!(state.phase, Phase::Committing);

        let action = run_future(effects).await.unwrap();
        assert_eq!(action, WorkflowAction::CommitSucceeded { flight: state.flight });

        let doc = store.document("tickets", "T-101").unwrap();
        assert_eq!(doc.get("status"), Some(&json!("used")));
        assert_eq!(doc.get("remarks"), Some(&json!("No remarks")));
        assert_eq!(doc.get("validatedBy"), Some(&json!("gate@example.com")));
        assert_eq!(doc.get("validatedAt"), Some(&json!("2025-01-01T00:00:00.000Z")));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_commit_effect_reports_store_failure() {
        let store = store();
        let env = env_with(&store, Some(operator()));
        let mut state = review(issued("T-101"));
        store.set_outage(Some(crate::document_store::DocumentStoreError::RequestFailed(
            "offline".to_string(),
        )));

        let effects = WorkflowReducer::new().reduce(&mut state, WorkflowAction::Commit, &env);
        let action = run_future(effects).await.unwrap();

        assert!(matches!(action, WorkflowAction::CommitFailed { .. }));
        assert!(store.get_document("tickets", "T-101").await.is_err());
    }

    // ========== Commit results ==========

    #[test]
    fn test_commit_success_resets_to_idle() {
        let committing_flight = FlightId::default().next().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::Commit,
                WorkflowAction::CommitSucceeded {
                    flight: committing_flight,
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(state.ticket.is_none());
                assert_eq!(state.feedback.as_ref().unwrap().message, "Ticket marked as used.");
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_commit_failure_returns_to_review() {
        let committing_flight = FlightId::default().next().next();
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::EditRemarks {
                    remarks: "VIP".to_string(),
                },
                WorkflowAction::Commit,
                WorkflowAction::CommitFailed {
                    flight: committing_flight,
                    error: RepositoryError::Transient("offline".to_string()),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Review);
                assert_eq!(state.ticket, Some(issued("T-101")));
                assert_eq!(state.remarks, "VIP");
                assert!(state
                    .feedback
                    .as_ref()
                    .unwrap()
                    .message
                    .starts_with("Failed to update ticket"));
            })
            .run();
    }

    #[test]
    fn test_commit_success_with_display_delay() {
        let committing_flight = FlightId::default().next().next();
        let env = test_env().with_settings(WorkflowSettings {
            commit_reset_delay: Some(Duration::from_millis(1500)),
            ..WorkflowSettings::default()
        });

        ReducerTest::new(WorkflowReducer::new())
            .with_env(env.clone())
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::Commit,
                WorkflowAction::CommitSucceeded {
                    flight: committing_flight,
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Committing);
                assert_eq!(state.feedback.as_ref().unwrap().message, "Ticket marked as used.");
            })
            .then_effects(assertions::assert_has_delay_effect)
            .run();

        ReducerTest::new(WorkflowReducer::new())
            .with_env(env)
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::Commit,
                WorkflowAction::CommitSucceeded {
                    flight: committing_flight,
                },
                WorkflowAction::ResetAfterCommit {
                    flight: committing_flight,
                },
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Idle);
                assert!(state.ticket.is_none());
            })
            .run();
    }

    #[test]
    fn test_stale_commit_result_is_discarded() {
        ReducerTest::new(WorkflowReducer::new())
            .with_env(test_env())
            .given_state(review(issued("T-101")))
            .when_actions([
                WorkflowAction::Commit,
                WorkflowAction::CommitSucceeded {
                    flight: FlightId::default(),
                },
            ])
            .then_state(|state| assert_eq!(state.phase, Phase::Committing))
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
