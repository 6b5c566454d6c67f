//! Kubernetes pod watch.
//!
//! [`KubeWatchSource`] watches pods through `kube::runtime::watcher` and
//! turns the watcher's events into [`WatchEvent`]s. The watcher relists after
//! a desync; [`PodEventTranslator`] compares each relist with what it has
//! reported so far and emits `Forgotten` for pods that vanished in between.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::watcher::{self, watcher, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::Client;
use pwod_core::WorkloadUid;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::pod::{pod_uid, workload_record};
use crate::watch::{forward, WatchEvent, WatchSource};

/// Translates pod watcher events into workload events.
#[derive(Debug, Default)]
pub struct PodEventTranslator {
    known: HashSet<WorkloadUid>,
    relisting: Option<HashSet<WorkloadUid>>,
    synced: bool,
}

impl PodEventTranslator {
    /// Create a translator that has seen nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a complete listing has been delivered at least once.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Translate one watcher event.
    pub fn translate(&mut self, event: watcher::Event<Pod>) -> Vec<WatchEvent> {
        match event {
            watcher::Event::Init => {
                debug!("Pod listing started");
                self.relisting = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(pod) => {
                let Some(record) = workload_record(&pod) else {
                    return Vec::new();
                };
                if let Some(seen) = self.relisting.as_mut() {
                    seen.insert(record.uid.clone());
                }
                self.known.insert(record.uid.clone());
                vec![WatchEvent::Observed(record)]
            }
            watcher::Event::InitDone => {
                self.synced = true;
                let Some(seen) = self.relisting.take() else {
                    return Vec::new();
                };
                let mut stale: Vec<WorkloadUid> =
                    self.known.difference(&seen).cloned().collect();
                stale.sort();
                self.known = seen;
                info!(
                    pods = self.known.len(),
                    stale = stale.len(),
                    "Pod listing complete"
                );
                stale.into_iter().map(WatchEvent::Forgotten).collect()
            }
            watcher::Event::Apply(pod) => {
                let Some(record) = workload_record(&pod) else {
                    return Vec::new();
                };
                self.known.insert(record.uid.clone());
                vec![WatchEvent::Observed(record)]
            }
            watcher::Event::Delete(pod) => {
                let Some(uid) = pod_uid(&pod) else {
                    return Vec::new();
                };
                self.known.remove(&uid);
                vec![WatchEvent::Forgotten(uid)]
            }
        }
    }
}

/// Watches pods in the cluster.
#[derive(Clone)]
pub struct KubeWatchSource {
    client: Client,
    namespace: Option<String>,
    label_selector: Option<String>,
    field_selector: Option<String>,
    error_budget: u32,
}

impl KubeWatchSource {
    /// Create a pod watch from the controller configuration.
    #[must_use]
    pub fn new(client: Client, config: &ControllerConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            label_selector: config.label_selector.clone(),
            field_selector: config.field_selector.clone(),
            error_budget: config.watch_error_budget,
        }
    }

    fn pods_api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn watcher_config(&self) -> WatcherConfig {
        let mut config = WatcherConfig::default();
        if let Some(labels) = &self.label_selector {
            config = config.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            config = config.fields(fields);
        }
        config
    }
}

#[async_trait]
impl WatchSource for KubeWatchSource {
    async fn run(
        self,
        events: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let watch = watcher(self.pods_api(), self.watcher_config()).default_backoff();

        info!(
            namespace = self.namespace.as_deref().unwrap_or("<all>"),
            label_selector = self.label_selector.as_deref().unwrap_or_default(),
            field_selector = self.field_selector.as_deref().unwrap_or_default(),
            "Starting pod watcher"
        );

        forward_pod_events(watch, &events, &cancel, self.error_budget).await
    }
}

/// Translate a pod watcher stream into `events` until `cancel` fires.
///
/// Errors before the first complete listing are fatal. Afterwards up to
/// `error_budget` consecutive errors are tolerated; any successful event
/// resets the count.
async fn forward_pod_events<S>(
    watch: S,
    events: &mpsc::Sender<WatchEvent>,
    cancel: &CancellationToken,
    error_budget: u32,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<watcher::Event<Pod>, watcher::Error>>,
{
    futures::pin_mut!(watch);

    let mut translator = PodEventTranslator::new();
    let mut consecutive_errors: u32 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Pod watcher stopped");
                return Ok(());
            }
            next = watch.next() => next,
        };

        let Some(event) = next else {
            warn!("Pod watch stream ended");
            return Err(ControllerError::WatchEnded);
        };

        match event {
            Ok(event) => {
                consecutive_errors = 0;
                for event in translator.translate(event) {
                    if !forward(events, event, cancel).await {
                        return Ok(());
                    }
                }
            }
            Err(e) if !translator.is_synced() => {
                error!(error = %e, "Initial pod listing failed");
                return Err(ControllerError::InitialSync(e));
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors > error_budget {
                    error!(
                        error = %e,
                        consecutive_errors,
                        "Pod watcher keeps failing, giving up"
                    );
                    return Err(ControllerError::WatchBudgetExhausted {
                        errors: consecutive_errors,
                        last: e.to_string(),
                    });
                }
                warn!(error = %e, consecutive_errors, "Pod watcher error, will retry");
            }
        }
    }
}

impl std::fmt::Debug for KubeWatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWatchSource")
            .field("namespace", &self.namespace)
            .field("label_selector", &self.label_selector)
            .field("field_selector", &self.field_selector)
            .field("error_budget", &self.error_budget)
            .finish_non_exhaustive()
    }
}
