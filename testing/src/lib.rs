//! # Turnstile Testing
//!
//! Testing utilities and helpers for the Turnstile workflow.
//!
//! This crate provides:
//! - A deterministic clock
//! - `ReducerTest`, a Given-When-Then harness for reducers
//! - Assertion helpers for effects
//! - Helpers for observing a running store
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::{test_clock, helpers::wait_for_action};
//! use turnstile_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_lookup_flow() {
//!     let store = Store::new(WorkflowState::default(), WorkflowReducer::new(), env);
//!     let mut actions = store.subscribe_actions();
//!
//!     store.send(WorkflowAction::OpenScanner).await?;
//!     feed.push("T-101")?;
//!
//!     wait_for_action(&mut actions, |a| matches!(a, WorkflowAction::TicketLoaded { .. }), TIMEOUT).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use turnstile_core::environment::Clock;


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making validation timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2);
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Helpers for driving a running store from tests.
pub mod helpers {
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Why [`wait_for_action`] gave up
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum WaitError {
        /// Nothing matched before the timeout
        Timeout,
        /// The store was dropped
        Closed,
    }

    /// Wait until an observed action matches `predicate`
    ///
    /// Lagged receivers skip ahead rather than fail.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] or [`WaitError::Closed`].
    pub async fn wait_for_action<A, F>(
        actions: &mut broadcast::Receiver<A>,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, WaitError>
    where
        A: Clone,
        F: Fn(&A) -> bool,
    {
        tokio::time::timeout(timeout, async {
            loop {
                match actions.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
                    Err(broadcast::error::RecvError::Closed) => return Err(WaitError::Closed),
                }
            }
        })
        .await
        .unwrap_or(Err(WaitError::Timeout))
    }

    /// Install a test-friendly tracing subscriber
    ///
    /// Safe to call from every test; only the first call installs it.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};
