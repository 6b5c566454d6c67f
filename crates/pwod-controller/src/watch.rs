//! Workload lifecycle events and the sources that produce them.

use async_trait::async_trait;
use pwod_core::{WorkloadRecord, WorkloadUid};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;

/// A workload lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A workload was added, or its current state was (re)observed.
    Observed(WorkloadRecord),
    /// A workload was removed.
    Forgotten(WorkloadUid),
}

/// Produces workload lifecycle events.
///
/// Events for one workload must be sent in the order they happened.
#[async_trait]
pub trait WatchSource: Send + 'static {
    /// Send events into `events` until `cancel` fires or the receiver is
    /// dropped.
    ///
    /// Returning `Ok(())` without being cancelled means the source is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails and cannot continue.
    async fn run(
        self,
        events: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Send one event, giving up if `cancel` fires first.
///
/// Returns `false` when the source should stop.
pub(crate) async fn forward(
    events: &mpsc::Sender<WatchEvent>,
    event: WatchEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = events.send(event) => {
            if sent.is_err() {
                debug!("Event receiver dropped");
            }
            sent.is_ok()
        }
    }
}

/// A source fed by an in-process channel.
///
/// Useful for embedding the controller behind another event feed, and in
/// tests. The source is exhausted once every sender is dropped.
#[derive(Debug)]
pub struct ChannelWatchSource {
    events: mpsc::Receiver<WatchEvent>,
}

impl ChannelWatchSource {
    /// Create a source and the sender that feeds it.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is zero.
    #[must_use]
    pub fn new(buffer: usize) -> (mpsc::Sender<WatchEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { events: rx })
    }
}

#[async_trait]
impl WatchSource for ChannelWatchSource {
    async fn run(
        mut self,
        events: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                event = self.events.recv() => event,
            };
            let Some(event) = event else {
                return Ok(());
            };
            if !forward(&events, event, &cancel).await {
                return Ok(());
            }
        }
    }
}
