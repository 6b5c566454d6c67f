//! The pod lifecycle controller.

use std::sync::Arc;

use pwod_session::{SessionContext, SessionProvider, SessionSettings};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{ControllerError, Result};
use crate::registry::LifecycleRegistry;
use crate::watch::WatchSource;

/// Drives sessions from a stream of workload lifecycle events.
///
/// The controller runs its [`WatchSource`] in a background task and
/// dispatches every event it produces. Session starts and cleanups run
/// concurrently; see [`EventDispatcher`] for the ordering guarantees.
pub struct Controller<W> {
    source: W,
    provider: Arc<dyn SessionProvider>,
    settings: SessionSettings,
    config: ControllerConfig,
    registry: Arc<LifecycleRegistry>,
}

impl<W: WatchSource> Controller<W> {
    /// Create a controller.
    #[must_use]
    pub fn new(
        source: W,
        provider: Arc<dyn SessionProvider>,
        settings: SessionSettings,
        config: ControllerConfig,
    ) -> Self {
        Self {
            source,
            provider,
            settings,
            config,
            registry: Arc::new(LifecycleRegistry::new()),
        }
    }

    /// The registry of sessions, for inspection while the controller runs.
    #[must_use]
    pub fn registry(&self) -> Arc<LifecycleRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run until `cancel` fires or the watch fails.
    ///
    /// In-flight session starts are cancelled on shutdown and the method
    /// waits for outstanding starts and cleanups before returning. Sessions
    /// still registered at that point are left as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the watch fails,
    /// or the watch ends without being cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.config.validate()?;

        let scope = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(self.config.event_buffer);
        let watch = tokio::spawn(self.source.run(tx, scope.clone()));

        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.registry),
            SessionContext::new(self.provider, self.settings, scope.clone()),
        );

        info!(
            namespace = self.config.namespace.as_deref().unwrap_or("<all>"),
            "Controller started"
        );

        let source_finished = loop {
            tokio::select! {
                biased;
                () = scope.cancelled() => break false,
                event = rx.recv() => match event {
                    Some(event) => dispatcher.dispatch(event),
                    None => break true,
                },
            }
        };

        let cancelled = scope.is_cancelled();
        scope.cancel();
        drop(rx);

        let result = match watch.await {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) if source_finished && !cancelled => Err(ControllerError::WatchEnded),
            Ok(Ok(())) => Ok(()),
            Err(e) => Err(ControllerError::Internal(format!("watch task failed: {e}"))),
        };

        dispatcher.wait_idle().await;

        match &result {
            Ok(()) => info!(sessions = self.registry.len(), "Controller stopped"),
            Err(e) => error!(
                error = %e,
                retriable = e.is_retriable(),
                sessions = self.registry.len(),
                "Controller failed"
            ),
        }
        result
    }
}

impl<W> std::fmt::Debug for Controller<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("sessions", &self.registry.len())
            .finish_non_exhaustive()
    }
}
