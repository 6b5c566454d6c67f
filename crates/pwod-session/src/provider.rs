//! The session provider seam.
//!
//! The protocol that actually speaks to the control plane lives behind
//! [`SessionProvider`]. A provider turns [`SessionParams`] into an
//! [`ActiveSession`]; the session is later released with
//! [`ActiveSession::cleanup`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::params::{SessionParams, SessionSettings};

/// Establishes simulated control-plane sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establish a session, blocking until it is up or has failed.
    ///
    /// Implementations must return promptly with `SessionError::Cancelled`
    /// once `cancel` fires. Retries and backoff are the provider's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be established.
    async fn run(
        &self,
        params: SessionParams,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ActiveSession>>;
}

/// A live session returned by a [`SessionProvider`].
#[async_trait]
pub trait ActiveSession: Send {
    /// Release the session.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails. The session is considered released
    /// either way.
    async fn cleanup(&mut self, cancel: &CancellationToken) -> Result<()>;
}

/// What a [`crate::SessionHandle`] needs to start and stop a session.
#[derive(Clone)]
pub struct SessionContext {
    provider: Arc<dyn SessionProvider>,
    settings: Arc<SessionSettings>,
    cancel: CancellationToken,
}

impl SessionContext {
    /// Create a context.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        settings: SessionSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
            cancel,
        }
    }

    /// The same context bound to a different cancellation token.
    #[must_use]
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            settings: Arc::clone(&self.settings),
            cancel,
        }
    }

    /// The session provider.
    #[must_use]
    pub fn provider(&self) -> &dyn SessionProvider {
        self.provider.as_ref()
    }

    /// Settings shared by all sessions.
    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The cancellation token operations must respect.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
