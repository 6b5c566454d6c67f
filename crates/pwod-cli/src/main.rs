//! pwod - one simulated proxy per pod.
//!
//! This is the entry point for the `pwod` binary. It watches pods and keeps a
//! control-plane session open for every pod that runs a proxy, so a control
//! plane can be load tested with the shape of a real cluster.

mod args;
mod webhook;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use pwod_controller::{Controller, KubeWatchSource};
use pwod_session::{AuthType, DialSessionProvider};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.debug {
        "info,pwod=debug,kube=info"
    } else {
        "info,kube=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let address = args.pilot_address();
    let mut settings = args.session_settings(&address);
    settings.auth.validate()?;

    let client = kube_client(args.kubeconfig.as_deref()).await?;
    info!("Connected to Kubernetes cluster");

    if settings.auth.auth_type == AuthType::Google {
        webhook::default_cloudrun_addr(&client, &mut settings.metadata).await?;
    }

    let config = args.controller_config();
    info!(
        pilot_address = %address,
        auth = %settings.auth.auth_type,
        cluster_id = %settings.cluster_id,
        delta = settings.delta,
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        "Starting pwod"
    );

    let provider = Arc::new(DialSessionProvider::new(args.dial_config(&address)));
    let source = KubeWatchSource::new(client, &config);
    let controller = Controller::new(source, provider, settings, config);
    let registry = controller.registry();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = controller.run(cancel).await;

    for slot in registry.snapshot() {
        info!(
            uid = %slot.uid,
            namespace = %slot.namespace,
            name = %slot.name,
            app_type = %slot.app_type,
            phase = ?slot.phase,
            "Session still open at exit"
        );
    }

    result.context("controller failed")
}

/// Build a Kubernetes client from an explicit kubeconfig, or the default
/// in-cluster / `$KUBECONFIG` resolution.
async fn kube_client(kubeconfig: Option<&Path>) -> anyhow::Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("failed to create Kubernetes client");
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("failed to load kubeconfig {}", path.display()))?;
    Client::try_from(config).context("failed to create Kubernetes client")
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl-C, shutting down");
            cancel.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
