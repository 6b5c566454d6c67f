//! An in-memory session provider for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pwod_core::WorkloadUid;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::params::SessionParams;
use crate::provider::{ActiveSession, SessionProvider};

/// A session provider that records calls instead of dialing anything.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to the code under test.
#[derive(Clone, Default)]
pub struct MockSessionProvider {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    runs: Vec<SessionParams>,
    failing: HashSet<WorkloadUid>,
    gate: Option<Arc<Semaphore>>,
    ignore_cancel: bool,
    fail_cleanup: bool,
    live: HashMap<WorkloadUid, usize>,
    cleanups: Vec<WorkloadUid>,
    double_releases: usize,
}

impl MockSessionProvider {
    /// Create a provider whose sessions always start.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run` fail with a handshake error for this workload.
    pub fn fail_for(&self, uid: &str) {
        self.state.lock().failing.insert(WorkloadUid::new(uid));
    }

    /// Block every `run` until [`MockSessionProvider::release_starts`] lets it through.
    pub fn hold_starts(&self) {
        self.state.lock().gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held `run` calls proceed.
    pub fn release_starts(&self, n: usize) {
        if let Some(gate) = &self.state.lock().gate {
            gate.add_permits(n);
        }
    }

    /// Ignore cancellation while a `run` is held, like a provider that only
    /// notices cancellation after its handshake completes.
    pub fn ignore_cancel(&self) {
        self.state.lock().ignore_cancel = true;
    }

    /// Make every session teardown report an error.
    pub fn fail_cleanups(&self) {
        self.state.lock().fail_cleanup = true;
    }

    /// Number of `run` calls, successful or not.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.state.lock().runs.len()
    }

    /// Parameters of every `run` call in call order.
    #[must_use]
    pub fn runs(&self) -> Vec<SessionParams> {
        self.state.lock().runs.clone()
    }

    /// Number of sessions released.
    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        self.state.lock().cleanups.len()
    }

    /// Workloads whose sessions were released, in release order.
    #[must_use]
    pub fn cleanups(&self) -> Vec<WorkloadUid> {
        self.state.lock().cleanups.clone()
    }

    /// Sessions started and not yet released.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.state.lock().live.values().sum()
    }

    /// Sessions started and not yet released for one workload.
    #[must_use]
    pub fn live_sessions_for(&self, uid: &str) -> usize {
        self.state
            .lock()
            .live
            .get(&WorkloadUid::new(uid))
            .copied()
            .unwrap_or(0)
    }

    /// Number of cleanup calls on an already released session.
    #[must_use]
    pub fn double_releases(&self) -> usize {
        self.state.lock().double_releases
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn run(
        &self,
        params: SessionParams,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ActiveSession>> {
        let (gate, ignore_cancel) = {
            let mut state = self.state.lock();
            state.runs.push(params.clone());
            (state.gate.clone(), state.ignore_cancel)
        };

        match gate {
            Some(gate) if ignore_cancel => {
                gate.acquire()
                    .await
                    .map_err(|_| SessionError::Cancelled)?
                    .forget();
            }
            Some(gate) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(SessionError::Cancelled),
                    permit = gate.acquire() => {
                        permit.map_err(|_| SessionError::Cancelled)?.forget();
                    }
                }
            }
            None if !ignore_cancel && cancel.is_cancelled() => {
                return Err(SessionError::Cancelled);
            }
            None => {}
        }

        let mut state = self.state.lock();
        if state.failing.contains(&params.uid) {
            return Err(SessionError::Handshake(format!(
                "simulated handshake failure for {}",
                params.uid
            )));
        }
        *state.live.entry(params.uid.clone()).or_default() += 1;

        Ok(Box::new(MockSession {
            uid: params.uid,
            state: Arc::clone(&self.state),
            released: false,
        }))
    }
}

struct MockSession {
    uid: WorkloadUid,
    state: Arc<Mutex<MockState>>,
    released: bool,
}

#[async_trait]
impl ActiveSession for MockSession {
    async fn cleanup(&mut self, _cancel: &CancellationToken) -> Result<()> {
        let mut state = self.state.lock();
        if self.released {
            state.double_releases += 1;
            return Ok(());
        }
        self.released = true;

        if let Some(count) = state.live.get_mut(&self.uid) {
            *count -= 1;
            if *count == 0 {
                state.live.remove(&self.uid);
            }
        }
        state.cleanups.push(self.uid.clone());

        if state.fail_cleanup {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "simulated teardown failure",
            )));
        }
        Ok(())
    }
}
