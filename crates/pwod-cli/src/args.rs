//! Command-line arguments and the settings derived from them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use pwod_controller::ControllerConfig;
use pwod_session::auth::DEFAULT_TRUST_DOMAIN;
use pwod_session::params::DEFAULT_CLUSTER_ID;
use pwod_session::{AuthOptions, AuthType, DialConfig, SessionSettings};

/// Control-plane address used from inside a cluster.
pub const IN_CLUSTER_ADDRESS: &str = "istiod.istio-system.svc:15010";

/// Control-plane address used from outside a cluster.
pub const LOCAL_ADDRESS: &str = "localhost:15010";

/// Simulate a control-plane session for every proxy-bearing pod.
#[derive(Parser, Debug)]
#[command(name = "pwod")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Control-plane address. Defaults to istiod in-cluster, localhost otherwise.
    #[arg(short = 'p', long, env = "PILOT_ADDRESS")]
    pub pilot_address: Option<String>,

    /// Auth type. Derived from the control-plane port when unset.
    #[arg(short = 'a', long, env = "PWOD_AUTH")]
    pub auth: Option<AuthType>,

    /// Path to a kubeconfig. Uses in-cluster config or `$KUBECONFIG` when unset.
    #[arg(short = 'k', long)]
    pub kubeconfig: Option<PathBuf>,

    /// xDS metadata as `key=value`, repeatable or comma separated.
    #[arg(short = 'm', long, value_parser = parse_key_value, value_delimiter = ',')]
    pub metadata: Vec<(String, String)>,

    /// Use delta xDS.
    #[arg(long, default_value = "false")]
    pub delta: bool,

    /// Cluster URL (for google auth).
    #[arg(long, default_value = "")]
    pub cluster_url: String,

    /// Trust domain of the workload identities.
    #[arg(long, default_value = DEFAULT_TRUST_DOMAIN)]
    pub trust_domain: String,

    /// Project number (for google auth).
    #[arg(long, default_value = "")]
    pub project_number: String,

    /// Cluster the simulated proxies claim to run in.
    #[arg(long, default_value = DEFAULT_CLUSTER_ID)]
    pub cluster_id: String,

    /// Only watch pods in this namespace.
    #[arg(long, env = "PWOD_NAMESPACE")]
    pub namespace: Option<String>,

    /// Label selector for the pod watch.
    #[arg(long)]
    pub label_selector: Option<String>,

    /// Field selector for the pod watch, e.g. `spec.nodeName=node-a`.
    #[arg(long)]
    pub field_selector: Option<String>,

    /// Control-plane connect timeout in milliseconds.
    #[arg(long = "connect-timeout", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Consecutive watch errors tolerated before giving up.
    #[arg(long, default_value = "5")]
    pub watch_error_budget: u32,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// The control-plane address, defaulted from the environment.
    #[must_use]
    pub fn pilot_address(&self) -> String {
        self.pilot_address.clone().unwrap_or_else(|| {
            let in_cluster = std::env::var_os("KUBERNETES_SERVICE_HOST").is_some();
            default_address(in_cluster).to_string()
        })
    }

    /// Auth options for a control-plane address.
    #[must_use]
    pub fn auth_options(&self, address: &str) -> AuthOptions {
        let auth_type = self.auth.unwrap_or_else(|| AuthType::for_address(address));
        AuthOptions {
            trust_domain: self.trust_domain.clone(),
            project_number: self.project_number.clone(),
            cluster_url: self.cluster_url.clone(),
            ..AuthOptions::new(auth_type)
        }
    }

    /// Settings shared by every session.
    #[must_use]
    pub fn session_settings(&self, address: &str) -> SessionSettings {
        SessionSettings {
            cluster_id: self.cluster_id.clone(),
            auth: self.auth_options(address),
            delta: self.delta,
            metadata: self.metadata.iter().cloned().collect::<BTreeMap<_, _>>(),
        }
    }

    /// Transport settings for a control-plane address.
    #[must_use]
    pub fn dial_config(&self, address: &str) -> DialConfig {
        DialConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            ..DialConfig::new(address)
        }
    }

    /// Controller settings.
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            watch_error_budget: self.watch_error_budget,
            ..ControllerConfig::default()
        }
    }
}

/// The default control-plane address.
#[must_use]
pub fn default_address(in_cluster: bool) -> &'static str {
    if in_cluster {
        IN_CLUSTER_ADDRESS
    } else {
        LOCAL_ADDRESS
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}
