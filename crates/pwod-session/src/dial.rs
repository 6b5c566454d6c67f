//! A session provider that holds a transport connection per workload.
//!
//! Every session opens its own TCP connection to the control plane and keeps
//! it until cleanup, so the control plane sees one client per simulated
//! proxy. The xDS exchange on top of the connection is owned by the protocol
//! implementation and is not performed here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::params::SessionParams;
use crate::provider::{ActiveSession, SessionProvider};

/// Configuration for [`DialSessionProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialConfig {
    /// Control-plane address (`host:port`).
    pub address: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "DialConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl DialConfig {
    const fn default_connect_timeout_ms() -> u64 {
        5_000
    }

    /// Config for an address with the default connect timeout.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }

    /// The connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Opens one TCP connection to the control plane per session.
#[derive(Debug, Clone)]
pub struct DialSessionProvider {
    config: DialConfig,
}

impl DialSessionProvider {
    /// Create a provider.
    #[must_use]
    pub fn new(config: DialConfig) -> Self {
        Self { config }
    }

    /// The provider configuration.
    #[must_use]
    pub fn config(&self) -> &DialConfig {
        &self.config
    }
}

#[async_trait]
impl SessionProvider for DialSessionProvider {
    async fn run(
        &self,
        params: SessionParams,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ActiveSession>> {
        let address = self.config.address.clone();
        let timeout = self.config.connect_timeout();

        let connect = tokio::time::timeout(
            timeout,
            TcpStream::connect(self.config.address.as_str()),
        );
        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => return Err(SessionError::Connect { address, source }),
                Err(_) => return Err(SessionError::ConnectTimeout { address, timeout }),
            },
        };
        stream.set_nodelay(true)?;

        info!(
            uid = %params.uid,
            node_id = %params.node_id(),
            identity = %params.credentials.spiffe_id(),
            auth = %params.credentials.auth_type,
            delta = params.delta,
            address = %address,
            "Session connected"
        );

        Ok(Box::new(DialSession {
            node_id: params.node_id(),
            stream: Some(stream),
        }))
    }
}

struct DialSession {
    node_id: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl ActiveSession for DialSession {
    async fn cleanup(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        debug!(node_id = %self.node_id, "Closing session connection");
        // Dropping the stream closes the socket even if shutdown is abandoned.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(
                    node_id = %self.node_id,
                    "Session shutdown abandoned, dropping connection"
                );
                Ok(())
            }
            result = stream.shutdown() => match result {
                Ok(()) => Ok(()),
                // The control plane closing first still leaves nothing to release.
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SessionSettings;
    use pwod_core::{classify, WorkloadRecord};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn params() -> SessionParams {
        let spec = classify(
            &WorkloadRecord::new("u1", "default", "gw")
                .with_containers(1, 0)
                .with_ip("10.0.0.1"),
        );
        SessionParams::for_workload(&spec, &SessionSettings::default())
    }

    #[test]
    fn config_defaults() {
        let config = DialConfig::new("localhost:15010");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connects_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let provider = DialSessionProvider::new(DialConfig::new(address));
        let cancel = CancellationToken::new();

        let (session, accepted) = tokio::join!(provider.run(params(), &cancel), listener.accept());
        let mut session = session.unwrap();
        let (mut server_side, _) = accepted.unwrap();

        session.cleanup(&cancel).await.unwrap();
        session.cleanup(&cancel).await.unwrap();

        // The server observes EOF once the session is closed.
        let mut buf = [0u8; 1];
        assert_eq!(server_side.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_cleanup_still_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let provider = DialSessionProvider::new(DialConfig::new(address));

        let run_cancel = CancellationToken::new();
        let (session, accepted) =
            tokio::join!(provider.run(params(), &run_cancel), listener.accept());
        let mut session = session.unwrap();
        let (mut server_side, _) = accepted.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        session.cleanup(&cancel).await.unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(server_side.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let provider = DialSessionProvider::new(DialConfig::new(address));
        let result = provider.run(params(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(SessionError::Connect { .. })));
    }

    #[tokio::test]
    async fn cancelled_before_connect() {
        let provider = DialSessionProvider::new(DialConfig::new("127.0.0.1:9"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider.run(params(), &cancel).await;
        assert!(matches!(result, Err(SessionError::Cancelled)));
    }
}
