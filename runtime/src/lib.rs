//! # Turnstile Runtime
//!
//! Runtime implementation for the Turnstile reducer architecture.
//!
//! This crate provides the [`Store`] that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state behind a write lock, so exactly one reducer call
//!   mutates it at a time no matter how many tasks feed it actions
//! - **Effect Executor**: Runs effect descriptions and feeds produced actions back
//! - **Cancellation Registry**: Tracks cancellable effects by [`EffectId`] so
//!   subscriptions can be released when a reducer asks for it
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_runtime::Store;
//!
//! let store = Store::new(WorkflowState::default(), WorkflowReducer::new(), env);
//!
//! store.send(WorkflowAction::OpenScanner).await?;
//!
//! let phase = store.state(|s| s.phase).await;
//! ```

use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::AbortHandle;
use turnstile_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects or for a terminal action
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Configuration for a [`Store`]
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Set the broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`]. Waiting on it covers the effects of the
/// sent action and of every action those effects feed back, so a lookup
/// started by a scan is complete (and its result reduced) once `wait()`
/// returns.
///
/// Long-lived streams keep the handle pending until they end or are cancelled.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Number of effects still running under this handle
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, nothing can still be running
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: tracking context shared by every effect spawned for one `send`
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: decrements the tracking counter on drop, including on abort
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Internal: decrements the store-wide pending counter on drop
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{
        broadcast, AbortHandle, Arc, AtomicBool, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectId, EffectTracking, Future, HashMap, Mutex, Ordering, PendingGuard,
        PoisonError, Reducer, RwLock, StoreConfig, StoreError, StreamExt,
    };

    struct StoreInner<S, A, E, R> {
        state: RwLock<S>,
        reducer: R,
        environment: E,
        cancellables: Mutex<HashMap<EffectId, Vec<AbortHandle>>>,
        shutdown: AtomicBool,
        shutdown_timeout: Duration,
        pending_effects: Arc<AtomicUsize>,
        action_broadcast: broadcast::Sender<A>,
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind a `RwLock`; the write lock is the single writer)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Cloning a store is cheap and yields another handle to the same state.
    pub struct Store<S, A, E, R> {
        inner: Arc<StoreInner<S, A, E, R>>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                inner: Arc::new(StoreInner {
                    state: RwLock::new(initial_state),
                    reducer,
                    environment,
                    cancellables: Mutex::new(HashMap::new()),
                    shutdown: AtomicBool::new(false),
                    shutdown_timeout: config.shutdown_timeout,
                    pending_effects: Arc::new(AtomicUsize::new(0)),
                    action_broadcast,
                }),
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Starts the returned effects before releasing the lock, so
        ///    cancellation registrations are ordered with state changes
        /// 4. Broadcasts the action to observers
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.inner.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();
            self.dispatch(action, &tracking).await;
            Ok(handle)
        }

        /// Send an action and wait for an action matching the predicate
        ///
        /// Subscribes before sending, so a fast effect cannot slip past.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action before the timeout
        /// - [`StoreError::ChannelClosed`]: broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.inner.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action after it has been reduced
        ///
        /// A receiver observes the action only once the state reflects it.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.inner.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let phase = store.state(|s| s.phase).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.inner.state.read().await;
            f(&*state)
        }

        /// Number of effects currently running across all sends
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.inner.pending_effects.load(Ordering::SeqCst)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, cancels every cancellable effect (releasing
        /// subscriptions), then waits for the remaining effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when the timeout expires.
        pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), StoreError> {
            let timeout = timeout.unwrap_or(self.inner.shutdown_timeout);
            tracing::info!(timeout_ms = timeout.as_millis(), "Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.inner.shutdown.store(true, Ordering::Release);
            self.cancel_all();

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(20);

            loop {
                let pending = self.inner.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        async fn dispatch(&self, action: A, tracking: &EffectTracking) {
            metrics::counter!("store.actions.total").increment(1);

            {
                let mut state = self.inner.state.write().await;

                let effects = tracing::debug_span!("reducer_execution").in_scope(|| {
                    self.inner
                        .reducer
                        .reduce(&mut state, action.clone(), &self.inner.environment)
                });
                tracing::trace!(effects = effects.len(), "Reducer completed");

                for effect in effects {
                    self.execute(effect, tracking, None);
                }
            }

            // No receivers is fine
            let _ = self.inner.action_broadcast.send(action);
        }

        /// Execute an effect under the given tracking context
        ///
        /// `scope` is the cancellation id inherited from an enclosing
        /// [`Effect::Cancellable`].
        fn execute(&self, effect: Effect<A>, tracking: &EffectTracking, scope: Option<&EffectId>) {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => {
                    let store = self.clone();
                    let feedback = tracking.clone();
                    self.spawn_effect("future", tracking, scope, async move {
                        if let Some(action) = fut.await {
                            store.dispatch(action, &feedback).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    let store = self.clone();
                    let feedback = tracking.clone();
                    self.spawn_effect("delay", tracking, scope, async move {
                        tokio::time::sleep(duration).await;
                        store.dispatch(*action, &feedback).await;
                    });
                },
                Effect::Stream(mut stream) => {
                    let store = self.clone();
                    let feedback = tracking.clone();
                    self.spawn_effect("stream", tracking, scope, async move {
                        while let Some(action) = stream.next().await {
                            store.dispatch(action, &feedback).await;
                        }
                        tracing::debug!("Effect::Stream ended");
                    });
                },
                Effect::Parallel(effects) => {
                    for effect in effects {
                        self.execute(effect, tracking, scope);
                    }
                },
                Effect::Sequential(effects) => {
                    let store = self.clone();
                    let scope_owned = scope.cloned();
                    self.spawn_effect("sequential", tracking, scope, async move {
                        for effect in effects {
                            let (mut step, step_tracking) = EffectHandle::new();
                            store.execute(effect, &step_tracking, scope_owned.as_ref());
                            drop(step_tracking);
                            step.wait().await;
                        }
                    });
                },
                Effect::Cancellable { id, effect } => {
                    self.execute(*effect, tracking, Some(&id));
                },
                Effect::Cancel(id) => self.cancel(&id),
            }
        }

        fn spawn_effect<F>(
            &self,
            kind: &'static str,
            tracking: &EffectTracking,
            scope: Option<&EffectId>,
            task: F,
        ) where
            F: Future<Output = ()> + Send + 'static,
        {
            metrics::counter!("store.effects.executed", "type" => kind).increment(1);

            tracking.increment();
            self.inner.pending_effects.fetch_add(1, Ordering::SeqCst);

            // Guards live inside the task so an abort releases them too
            let tracking_guard = DecrementGuard(tracking.clone());
            let pending_guard = PendingGuard(Arc::clone(&self.inner.pending_effects));

            let handle = tokio::spawn(async move {
                let _tracking_guard = tracking_guard;
                let _pending_guard = pending_guard;
                task.await;
            });

            if let Some(id) = scope {
                let mut registry = self
                    .inner
                    .cancellables
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let handles = registry.entry(id.clone()).or_default();
                handles.retain(|h| !h.is_finished());
                handles.push(handle.abort_handle());
            }
        }

        fn cancel(&self, id: &EffectId) {
            let handles = self
                .inner
                .cancellables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(id)
                .unwrap_or_default();

            tracing::debug!(effect_id = %id, tasks = handles.len(), "Cancelling effect");
            metrics::counter!("store.effects.cancelled").increment(1);

            for handle in handles {
                handle.abort();
            }
        }

        fn cancel_all(&self) {
            let registry: Vec<_> = self
                .inner
                .cancellables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .collect();

            for (id, handles) in registry {
                tracing::debug!(effect_id = %id, tasks = handles.len(), "Cancelling effect for shutdown");
                for handle in handles {
                    handle.abort();
                }
            }
        }
    }
}

pub use store::Store;
