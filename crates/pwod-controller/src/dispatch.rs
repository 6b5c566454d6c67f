//! Event dispatch.
//!
//! [`EventDispatcher`] applies lifecycle events to the registry in the order
//! they are delivered and runs the resulting session starts and cleanups as
//! background tasks. Registry updates happen before `dispatch` returns, so
//! events for the same workload are ordered even though their session I/O
//! runs concurrently.

use std::sync::Arc;

use pwod_core::{classify, WorkloadRecord, WorkloadUid};
use pwod_session::{SessionContext, SessionError, SessionHandle};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::registry::{Admission, LifecycleRegistry, PendingStart, Release, Settlement};
use crate::watch::WatchEvent;

/// Applies lifecycle events to a [`LifecycleRegistry`].
#[derive(Debug)]
pub struct EventDispatcher {
    registry: Arc<LifecycleRegistry>,
    context: SessionContext,
    tasks: TaskTracker,
}

impl EventDispatcher {
    /// Create a dispatcher.
    ///
    /// Session starts are cancelled when the context's token fires.
    #[must_use]
    pub fn new(registry: Arc<LifecycleRegistry>, context: SessionContext) -> Self {
        Self {
            registry,
            context,
            tasks: TaskTracker::new(),
        }
    }

    /// The registry this dispatcher updates.
    #[must_use]
    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// Number of session starts and cleanups still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Apply one event.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, event: WatchEvent) {
        match event {
            WatchEvent::Observed(record) => self.observe(&record),
            WatchEvent::Forgotten(uid) => self.forget(&uid),
        }
    }

    /// Classify a workload and start its session if it runs a proxy.
    pub fn observe(&self, record: &WorkloadRecord) {
        let spec = classify(record);

        match self.registry.admit(spec, self.context.cancel_token()) {
            Admission::Start(pending) => {
                debug!(
                    uid = %pending.handle.uid(),
                    generation = pending.generation,
                    "Starting session"
                );
                let registry = Arc::clone(&self.registry);
                let context = self.context.clone();
                self.tasks.spawn(run_start(registry, context, pending));
            }
            Admission::Unchanged => {
                debug!(uid = %record.uid, "Workload unchanged");
            }
            Admission::NoProxy { retired } => {
                debug!(
                    uid = %record.uid,
                    name = %record.name,
                    namespace = %record.namespace,
                    "Workload has no proxy, ignoring"
                );
                if let Some(handle) = retired {
                    self.spawn_cleanup(handle);
                }
            }
        }
    }

    /// Release a workload's session, if it has one.
    pub fn forget(&self, uid: &WorkloadUid) {
        match self.registry.release(uid) {
            Release::Unknown => {
                debug!(uid = %uid, "Forgotten workload has no session");
            }
            Release::Cancelled => {
                info!(uid = %uid, "Workload removed while its session was starting");
            }
            Release::Cleanup(handle) => self.spawn_cleanup(handle),
        }
    }

    /// Wait until every start and cleanup dispatched so far has finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn spawn_cleanup(&self, mut handle: SessionHandle) {
        let context = self.context.clone();
        self.tasks.spawn(async move {
            cleanup_session(&mut handle, &context).await;
        });
    }
}

async fn run_start(
    registry: Arc<LifecycleRegistry>,
    context: SessionContext,
    pending: PendingStart,
) {
    let PendingStart {
        generation,
        mut handle,
        cancel,
        retired,
    } = pending;

    if let Some(mut old) = retired {
        cleanup_session(&mut old, &context).await;
    }

    let uid = handle.uid().clone();
    let result = handle.start(&context.with_cancel(cancel)).await;

    match &result {
        Ok(()) => {
            let spec = handle.spec();
            info!(
                uid = %uid,
                name = %spec.name,
                namespace = %spec.namespace,
                app_type = %spec.app_type,
                "Session started"
            );
        }
        Err(SessionError::Cancelled) => {
            debug!(uid = %uid, "Session start cancelled");
        }
        Err(e) => {
            error!(uid = %uid, error = %e, retriable = e.is_retriable(), "Failed to start session");
        }
    }

    match registry.settle(&uid, generation, handle, result.is_ok()) {
        Settlement::Registered | Settlement::Discarded => {}
        Settlement::Orphaned(mut handle) => {
            warn!(uid = %uid, "Workload went away while its session was starting, releasing");
            cleanup_session(&mut handle, &context).await;
        }
    }
}

async fn cleanup_session(handle: &mut SessionHandle, context: &SessionContext) {
    let spec = handle.spec().clone();
    match handle.cleanup(context).await {
        Ok(()) => {
            info!(
                uid = %spec.uid,
                name = %spec.name,
                namespace = %spec.namespace,
                "Session cleaned up"
            );
        }
        Err(e) => {
            error!(uid = %spec.uid, error = %e, "Failed to clean up session");
        }
    }
}
