//! Defaulting of the `CLOUDRUN_ADDR` metadata for managed control planes.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use k8s_openapi::api::admissionregistration::v1::MutatingWebhookConfiguration;
use kube::api::Api;
use kube::Client;
use tracing::{debug, info};
use url::Url;

/// Metadata key carrying the managed control plane's address.
pub const CLOUDRUN_ADDR: &str = "CLOUDRUN_ADDR";

/// Webhook configuration installed by the managed control plane.
pub const MANAGED_WEBHOOK: &str = "istiod-asm-managed";

/// Fill in `CLOUDRUN_ADDR` from the managed control plane's webhook, unless
/// it is already set.
///
/// # Errors
///
/// Returns an error if the webhook configuration cannot be read or its first
/// webhook is not addressed by URL.
pub async fn default_cloudrun_addr(
    client: &Client,
    metadata: &mut BTreeMap<String, String>,
) -> anyhow::Result<()> {
    if metadata.contains_key(CLOUDRUN_ADDR) {
        debug!("CLOUDRUN_ADDR already set");
        return Ok(());
    }

    let webhooks: Api<MutatingWebhookConfiguration> = Api::all(client.clone());
    let config = webhooks
        .get(MANAGED_WEBHOOK)
        .await
        .with_context(|| format!("failed to default {CLOUDRUN_ADDR}: reading {MANAGED_WEBHOOK}"))?;

    if let Some(address) = cloudrun_addr(&config)? {
        info!(address = %address, "Defaulted CLOUDRUN_ADDR");
        metadata.insert(CLOUDRUN_ADDR.to_string(), address);
    }
    Ok(())
}

/// The address of the first webhook, if there is one.
///
/// # Errors
///
/// Returns an error if the first webhook has no client URL, or if that URL
/// is not absolute or carries no host.
pub fn cloudrun_addr(config: &MutatingWebhookConfiguration) -> anyhow::Result<Option<String>> {
    let Some(webhook) = config.webhooks.as_ref().and_then(|w| w.first()) else {
        return Ok(None);
    };
    let Some(url) = webhook.client_config.url.as_deref() else {
        bail!("failed to default {CLOUDRUN_ADDR}: clientConfig is not a URL");
    };
    url_host(url)
        .map(Some)
        .with_context(|| format!("failed to default {CLOUDRUN_ADDR}: invalid webhook URL {url:?}"))
}

/// The `host:port` a webhook URL points at.
///
/// The port is always present: when the URL omits it, the scheme's default
/// is filled in, so `https://a.run.app` yields `a.run.app:443`.
fn url_host(url: &str) -> anyhow::Result<String> {
    let url = Url::parse(url)?;
    let Some(host) = url.host_str() else {
        bail!("URL has no host");
    };
    let Some(port) = url.port_or_known_default() else {
        bail!("URL has no port and scheme {} has no default", url.scheme());
    };
    Ok(format!("{host}:{port}"))
}
