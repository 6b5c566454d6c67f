//! Translation from Kubernetes pods to workload records.

use k8s_openapi::api::core::v1::Pod;
use pwod_core::{WorkloadRecord, WorkloadUid};
use tracing::warn;

/// The identity of a pod, if the API server assigned one.
#[must_use]
pub fn pod_uid(pod: &Pod) -> Option<WorkloadUid> {
    pod.metadata
        .uid
        .as_deref()
        .and_then(|uid| WorkloadUid::parse(uid).ok())
}

/// Build a [`WorkloadRecord`] from a pod.
///
/// Fields the API server has not populated yet (pod IP, node) are left
/// empty. Returns `None` for a pod without a uid.
#[must_use]
pub fn workload_record(pod: &Pod) -> Option<WorkloadRecord> {
    let Some(uid) = pod_uid(pod) else {
        warn!(
            namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
            name = pod.metadata.name.as_deref().unwrap_or_default(),
            "Skipping pod without uid"
        );
        return None;
    };

    let spec = pod.spec.as_ref();

    Some(WorkloadRecord {
        uid,
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        ip: pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.clone())
            .unwrap_or_default(),
        node: spec.and_then(|s| s.node_name.clone()).unwrap_or_default(),
        service_account: spec
            .and_then(|s| s.service_account_name.clone())
            .unwrap_or_default(),
        containers: spec.map_or(0, |s| s.containers.len()),
        init_containers: spec
            .and_then(|s| s.init_containers.as_ref())
            .map_or(0, Vec::len),
    })
}
