//! Session parameters handed to a session provider.

use std::collections::BTreeMap;

use pwod_core::{ApplicationType, WorkloadSpec, WorkloadUid};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthOptions, SessionCredentials};

/// Cluster identifier used when none is configured.
pub const DEFAULT_CLUSTER_ID: &str = "Kubernetes";

/// Settings shared by every session the controller starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Cluster the simulated proxies claim to run in.
    #[serde(default = "SessionSettings::default_cluster_id")]
    pub cluster_id: String,
    /// Authentication options.
    #[serde(default)]
    pub auth: AuthOptions,
    /// Use the incremental (delta) transport variant.
    #[serde(default)]
    pub delta: bool,
    /// Extra node metadata sent by every session.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SessionSettings {
    fn default_cluster_id() -> String {
        DEFAULT_CLUSTER_ID.to_string()
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cluster_id: Self::default_cluster_id(),
            auth: AuthOptions::default(),
            delta: false,
            metadata: BTreeMap::new(),
        }
    }
}

/// Everything a provider needs to establish one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Identity of the workload the session stands in for.
    pub uid: WorkloadUid,
    /// Workload labels.
    pub labels: BTreeMap<String, String>,
    /// Workload namespace.
    pub namespace: String,
    /// Workload display name.
    pub name: String,
    /// Workload address.
    pub ip: String,
    /// Proxy role.
    pub app_type: ApplicationType,
    /// Cluster identifier.
    pub cluster_id: String,
    /// Authentication parameters for this workload.
    pub credentials: SessionCredentials,
    /// Use the delta transport variant.
    pub delta: bool,
    /// Extra node metadata.
    pub metadata: BTreeMap<String, String>,
}

impl SessionParams {
    /// Build the parameters for a workload.
    #[must_use]
    pub fn for_workload(spec: &WorkloadSpec, settings: &SessionSettings) -> Self {
        Self {
            uid: spec.uid.clone(),
            labels: spec.labels.clone(),
            namespace: spec.namespace.clone(),
            name: spec.name.clone(),
            ip: spec.ip.clone(),
            app_type: spec.app_type,
            cluster_id: settings.cluster_id.clone(),
            credentials: settings
                .auth
                .credentials_for(&spec.service_account, &spec.namespace),
            delta: settings.delta,
            metadata: settings.metadata.clone(),
        }
    }

    /// The proxy node id in the `type~ip~name.namespace~domain` form.
    ///
    /// Gateways identify as `router`, the proxy type control planes expect.
    #[must_use]
    pub fn node_id(&self) -> String {
        let proxy_type = match self.app_type {
            ApplicationType::Gateway => "router",
            other => other.as_str(),
        };
        format!(
            "{proxy_type}~{}~{}.{}~{}.svc.cluster.local",
            self.ip, self.name, self.namespace, self.namespace
        )
    }
}
