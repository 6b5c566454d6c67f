//! Per-workload session handle.
//!
//! # Lifecycle
//!
//! ```text
//!   ┌─────────┐  start (proxy type, provider ok)   ┌─────────┐
//!   │ Created │───────────────────────────────────▶│ Running │
//!   └────┬────┘                                    └────┬────┘
//!        │ start (no proxy, or provider error)          │ cleanup
//!        ▼                                              ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │                         Closed                          │
//!   └─────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use pwod_core::{WorkloadSpec, WorkloadUid};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::params::SessionParams;
use crate::provider::{ActiveSession, SessionContext};

/// Lifecycle state of a [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    /// Spec known, no session yet.
    Created,
    /// A session is established.
    Running,
    /// The session was released or never existed.
    Closed,
}

/// Owns one workload's spec and, while running, its session.
pub struct SessionHandle {
    spec: WorkloadSpec,
    state: HandleState,
    session: Option<Box<dyn ActiveSession>>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionHandle {
    /// Create a handle in the `Created` state.
    #[must_use]
    pub fn new(spec: WorkloadSpec) -> Self {
        Self {
            spec,
            state: HandleState::Created,
            session: None,
            started_at: None,
        }
    }

    /// The workload spec.
    #[must_use]
    pub fn spec(&self) -> &WorkloadSpec {
        &self.spec
    }

    /// The workload identity.
    #[must_use]
    pub fn uid(&self) -> &WorkloadUid {
        &self.spec.uid
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// When the session was established.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether a session is currently held.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Start the session for this workload.
    ///
    /// Succeeds without side effects for workloads without a proxy. The
    /// provider's error is returned unchanged and is not retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` if the handle has left the
    /// `Created` state, or the provider's error if the session cannot be
    /// established.
    pub async fn start(&mut self, ctx: &SessionContext) -> Result<()> {
        if self.state != HandleState::Created {
            return Err(SessionError::AlreadyStarted(self.spec.uid.clone()));
        }

        if !self.spec.app_type.has_proxy() {
            debug!(
                uid = %self.spec.uid,
                app_type = %self.spec.app_type,
                "Workload has no proxy, skipping session"
            );
            self.state = HandleState::Closed;
            return Ok(());
        }

        let params = SessionParams::for_workload(&self.spec, ctx.settings());
        match ctx.provider().run(params, ctx.cancel_token()).await {
            Ok(session) => {
                self.session = Some(session);
                self.started_at = Some(Utc::now());
                self.state = HandleState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = HandleState::Closed;
                Err(e)
            }
        }
    }

    /// Release the session, if one was started.
    ///
    /// Idempotent: the session is taken out of the handle before teardown, so
    /// a second call finds nothing to release.
    ///
    /// # Errors
    ///
    /// Returns the provider's teardown error. The handle is `Closed` either way.
    pub async fn cleanup(&mut self, ctx: &SessionContext) -> Result<()> {
        self.state = HandleState::Closed;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.cleanup(ctx.cancel_token()).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("uid", &self.spec.uid)
            .field("app_type", &self.spec.app_type)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}
