//! Error types for session operations.

use std::time::Duration;

use pwod_core::WorkloadUid;
use thiserror::Error;

/// Errors that can occur while starting or cleaning up a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The control plane could not be reached.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address that was dialed.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Connecting did not complete in time.
    #[error("timed out after {timeout:?} connecting to {address}")]
    ConnectTimeout {
        /// Address that was dialed.
        address: String,
        /// The connect timeout that elapsed.
        timeout: Duration,
    },

    /// The control plane rejected the session handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The operation was aborted through its cancellation token.
    #[error("session operation cancelled")]
    Cancelled,

    /// `start` was called on a handle that already left the `Created` state.
    #[error("session for workload {0} was already started")]
    AlreadyStarted(WorkloadUid),

    /// Transport error on an established session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::ConnectTimeout { .. } | Self::Handshake(_) | Self::Io(_)
        )
    }
}

/// A specialized Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
