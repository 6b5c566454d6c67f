//! Workload records, specs and classification.
//!
//! A [`WorkloadRecord`] is the raw view of a workload instance as read from the
//! cluster. [`classify`] turns it into an immutable [`WorkloadSpec`] tagged
//! with the [`ApplicationType`] that decides whether a simulated proxy session
//! is needed.
//!
//! # Classification
//!
//! ```text
//!   primary containers == 1  ──────────────▶ Gateway  (proxy)
//!   else init containers == 0 ─────────────▶ Ambient  (no proxy)
//!   else ──────────────────────────────────▶ Sidecar  (proxy)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::WorkloadUid;

/// The proxy role of a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Application container with an injected sidecar proxy.
    Sidecar,
    /// A standalone proxy acting as a gateway.
    Gateway,
    /// Workload captured by a node-level proxy; it has no proxy of its own.
    Ambient,
}

impl ApplicationType {
    /// Classify a workload by its container shape.
    #[must_use]
    pub const fn from_shape(containers: usize, init_containers: usize) -> Self {
        if containers == 1 {
            Self::Gateway
        } else if init_containers == 0 {
            Self::Ambient
        } else {
            Self::Sidecar
        }
    }

    /// Whether workloads of this type run their own proxy and therefore need
    /// a simulated control-plane session.
    #[must_use]
    pub const fn has_proxy(&self) -> bool {
        matches!(self, Self::Sidecar | Self::Gateway)
    }

    /// The lowercase tag used on the wire and in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sidecar => "sidecar",
            Self::Gateway => "gateway",
            Self::Ambient => "ambient",
        }
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workload instance as observed in the cluster.
///
/// Optional fields that the cluster has not populated yet (for example the
/// address of a pod that is not scheduled) are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    /// Stable unique identity.
    pub uid: WorkloadUid,
    /// Namespace the workload lives in.
    pub namespace: String,
    /// Workload name.
    pub name: String,
    /// Workload labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Assigned network address.
    #[serde(default)]
    pub ip: String,
    /// Node the workload is assigned to.
    #[serde(default)]
    pub node: String,
    /// Declared service identity (service account).
    #[serde(default)]
    pub service_account: String,
    /// Number of primary containers.
    #[serde(default)]
    pub containers: usize,
    /// Number of initialization containers.
    #[serde(default)]
    pub init_containers: usize,
}

impl WorkloadRecord {
    /// Create a record with the given identity and no other details.
    #[must_use]
    pub fn new(
        uid: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            uid: WorkloadUid::new(uid),
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            ip: String::new(),
            node: String::new(),
            service_account: String::new(),
            containers: 0,
            init_containers: 0,
        }
    }

    /// Set the container shape.
    #[must_use]
    pub fn with_containers(mut self, containers: usize, init_containers: usize) -> Self {
        self.containers = containers;
        self.init_containers = init_containers;
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the network address.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    /// Set the node.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Set the service account.
    #[must_use]
    pub fn with_service_account(mut self, service_account: impl Into<String>) -> Self {
        self.service_account = service_account.into();
        self
    }
}

/// The immutable specification derived from a [`WorkloadRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Service identity the session authenticates as.
    pub service_account: String,
    /// Node the workload runs on.
    pub node: String,
    /// Display name of the workload.
    pub name: String,
    /// Namespace of the workload.
    pub namespace: String,
    /// Workload labels.
    pub labels: BTreeMap<String, String>,
    /// Stable unique identity.
    pub uid: WorkloadUid,
    /// Network address; empty if not assigned yet.
    pub ip: String,
    /// Proxy role.
    pub app_type: ApplicationType,
}

impl WorkloadSpec {
    /// `namespace/name`, used when logging.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Derive the [`WorkloadSpec`] for a record.
///
/// Total and deterministic: every record yields a spec and the same record
/// always yields the same spec.
#[must_use]
pub fn classify(record: &WorkloadRecord) -> WorkloadSpec {
    WorkloadSpec {
        service_account: record.service_account.clone(),
        node: record.node.clone(),
        name: record.name.clone(),
        namespace: record.namespace.clone(),
        labels: record.labels.clone(),
        uid: record.uid.clone(),
        ip: record.ip.clone(),
        app_type: ApplicationType::from_shape(record.containers, record.init_containers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(containers: usize, init_containers: usize) -> WorkloadRecord {
        WorkloadRecord::new("uid-1", "default", "app").with_containers(containers, init_containers)
    }

    #[test]
    fn classification_table() {
        // Exactly one primary container wins regardless of init containers.
        assert_eq!(ApplicationType::from_shape(1, 0), ApplicationType::Gateway);
        assert_eq!(ApplicationType::from_shape(1, 3), ApplicationType::Gateway);

        // No init containers means no injected proxy.
        assert_eq!(ApplicationType::from_shape(0, 0), ApplicationType::Ambient);
        assert_eq!(ApplicationType::from_shape(2, 0), ApplicationType::Ambient);
        assert_eq!(ApplicationType::from_shape(5, 0), ApplicationType::Ambient);

        assert_eq!(ApplicationType::from_shape(2, 1), ApplicationType::Sidecar);
        assert_eq!(ApplicationType::from_shape(0, 1), ApplicationType::Sidecar);
        assert_eq!(ApplicationType::from_shape(3, 2), ApplicationType::Sidecar);
    }

    #[test]
    fn classification_is_total_over_shapes() {
        for containers in 0..6 {
            for init_containers in 0..6 {
                let app_type = classify(&record(containers, init_containers)).app_type;
                let expected = if containers == 1 {
                    ApplicationType::Gateway
                } else if init_containers == 0 {
                    ApplicationType::Ambient
                } else {
                    ApplicationType::Sidecar
                };
                assert_eq!(app_type, expected, "shape ({containers}, {init_containers})");
            }
        }
    }

    #[test]
    fn has_proxy() {
        assert!(ApplicationType::Sidecar.has_proxy());
        assert!(ApplicationType::Gateway.has_proxy());
        assert!(!ApplicationType::Ambient.has_proxy());
    }

    #[test]
    fn classify_copies_fields() {
        let record = WorkloadRecord::new("uid-7", "bookinfo", "reviews-v1")
            .with_containers(2, 1)
            .with_label("app", "reviews")
            .with_label("version", "v1")
            .with_ip("10.0.3.7")
            .with_node("node-a")
            .with_service_account("bookinfo-reviews");

        let spec = classify(&record);

        assert_eq!(spec.uid, WorkloadUid::new("uid-7"));
        assert_eq!(spec.namespace, "bookinfo");
        assert_eq!(spec.name, "reviews-v1");
        assert_eq!(spec.ip, "10.0.3.7");
        assert_eq!(spec.node, "node-a");
        assert_eq!(spec.service_account, "bookinfo-reviews");
        assert_eq!(spec.labels.get("version").map(String::as_str), Some("v1"));
        assert_eq!(spec.app_type, ApplicationType::Sidecar);
        assert_eq!(spec.qualified_name(), "bookinfo/reviews-v1");
    }

    #[test]
    fn classify_is_deterministic() {
        let record = record(2, 1).with_label("app", "x");
        assert_eq!(classify(&record), classify(&record));
    }

    #[test]
    fn classify_keeps_empty_fields() {
        let spec = classify(&record(1, 0));
        assert!(spec.ip.is_empty());
        assert!(spec.node.is_empty());
        assert!(spec.service_account.is_empty());
        assert!(spec.labels.is_empty());
    }

    #[test]
    fn app_type_display() {
        assert_eq!(ApplicationType::Sidecar.to_string(), "sidecar");
        assert_eq!(ApplicationType::Gateway.to_string(), "gateway");
        assert_eq!(ApplicationType::Ambient.to_string(), "ambient");
    }

    #[test]
    fn app_type_serde() {
        let json = serde_json::to_string(&ApplicationType::Gateway).unwrap();
        assert_eq!(json, "\"gateway\"");
    }
}
