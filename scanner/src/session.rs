//! Session boundary.
//!
//! Publishes the operator's session as a reactive [`SessionPhase`] and gates
//! access to the scanner on it. Authentication itself belongs to an external
//! identity provider; this module only asks it who is signed in and tells it
//! to sign out. No retries.

use crate::types::Identity;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

/// Boxed future returned by identity provider calls
pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send>>;

/// Session failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session has not been resolved yet
    #[error("Session is still loading")]
    Loading,

    /// Nobody is signed in
    #[error("Not signed in")]
    NotAuthenticated,

    /// The identity provider failed
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// External authentication provider
pub trait IdentityProvider: Send + Sync {
    /// The signed-in identity, if any
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Provider`] if the provider cannot be reached.
    fn current_identity(&self) -> ProviderFuture<Option<Identity>>;

    /// End the provider session
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Provider`] if the provider cannot be reached.
    fn sign_out(&self) -> ProviderFuture<()>;
}

/// Identity provider holding one fixed operator (from configuration)
#[derive(Clone, Default)]
pub struct StaticIdentityProvider {
    identity: Arc<Mutex<Option<Identity>>>,
}

impl StaticIdentityProvider {
    /// Provider with `identity` signed in (or nobody, for `None`)
    #[must_use]
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            identity: Arc::new(Mutex::new(identity)),
        }
    }

    fn with_identity<T>(&self, f: impl FnOnce(&mut Option<Identity>) -> T) -> Result<T, SessionError> {
        self.identity
            .lock()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| SessionError::Provider("identity lock poisoned".to_string()))
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_identity(&self) -> ProviderFuture<Option<Identity>> {
        let result = self.with_identity(|identity| identity.clone());
        Box::pin(async move { result })
    }

    fn sign_out(&self) -> ProviderFuture<()> {
        let result = self.with_identity(|identity| {
            *identity = None;
        });
        Box::pin(async move { result })
    }
}

/// Where the session currently is
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Not resolved yet; protected views must not render
    Loading,
    /// Nobody is signed in
    SignedOut,
    /// An operator is signed in
    SignedIn(Identity),
}

/// Which surface the host should show
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Session still resolving
    Loading,
    /// Login surface (external)
    Login,
    /// The scanner workflow
    Scanner,
}

impl Route {
    /// Route for a session phase
    #[must_use]
    pub const fn for_phase(phase: &SessionPhase) -> Self {
        match phase {
            SessionPhase::Loading => Self::Loading,
            SessionPhase::SignedOut => Self::Login,
            SessionPhase::SignedIn(_) => Self::Scanner,
        }
    }
}

/// Read-only view of the session, shared with the workflow environment
#[derive(Clone, Debug)]
pub struct SessionHandle {
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Signed-in identity, if any
    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        match &*self.phase.borrow() {
            SessionPhase::SignedIn(identity) => Some(identity.clone()),
            SessionPhase::Loading | SessionPhase::SignedOut => None,
        }
    }

    /// Wait for the next phase change
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] if the boundary is gone.
    pub async fn changed(&mut self) -> Result<SessionPhase, SessionError> {
        self.phase
            .changed()
            .await
            .map_err(|_| SessionError::NotAuthenticated)?;
        Ok(self.phase.borrow_and_update().clone())
    }

    /// A handle permanently signed in as `identity`, for tests and tools
    #[must_use]
    pub fn fixed(identity: Option<Identity>) -> Self {
        let phase = identity.map_or(SessionPhase::SignedOut, SessionPhase::SignedIn);
        let (tx, rx) = watch::channel(phase);
        // Keep the value readable after the sender is dropped
        drop(tx);
        Self { phase: rx }
    }
}

/// Gate between the operator and the scanner workflow
pub struct SessionBoundary {
    provider: Arc<dyn IdentityProvider>,
    phase: watch::Sender<SessionPhase>,
}

impl SessionBoundary {
    /// Create a boundary in the `Loading` phase
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Loading);
        Self { provider, phase }
    }

    /// Resolve the session from the provider
    ///
    /// A provider failure leaves the session signed out.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Provider`] if the provider fails.
    pub async fn initialize(&self) -> Result<SessionPhase, SessionError> {
        let phase = match self.provider.current_identity().await {
            Ok(Some(identity)) => {
                tracing::info!(operator = identity.label(), "Session resolved");
                SessionPhase::SignedIn(identity)
            },
            Ok(None) => {
                tracing::info!("No operator signed in");
                SessionPhase::SignedOut
            },
            Err(error) => {
                tracing::error!(%error, "Session resolution failed");
                self.phase.send_replace(SessionPhase::SignedOut);
                return Err(error);
            },
        };

        self.phase.send_replace(phase.clone());
        Ok(phase)
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    /// Surface the host should show
    #[must_use]
    pub fn route(&self) -> Route {
        Route::for_phase(&self.phase.borrow())
    }

    /// Admit the operator to the scanner
    ///
    /// # Errors
    ///
    /// [`SessionError::Loading`] while unresolved, [`SessionError::NotAuthenticated`]
    /// when signed out.
    pub fn admit(&self) -> Result<Identity, SessionError> {
        match &*self.phase.borrow() {
            SessionPhase::Loading => Err(SessionError::Loading),
            SessionPhase::SignedOut => Err(SessionError::NotAuthenticated),
            SessionPhase::SignedIn(identity) => Ok(identity.clone()),
        }
    }

    /// End the session and return to the login surface
    ///
    /// The local phase becomes `SignedOut` even if the provider call fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Provider`] if the provider fails.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let result = self.provider.sign_out().await;
        self.phase.send_replace(SessionPhase::SignedOut);
        metrics::counter!("session.sign_outs.total").increment(1);
        tracing::info!("Operator signed out");
        result
    }

    /// Handle for observers and the workflow environment
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            phase: self.phase.subscribe(),
        }
    }
}
