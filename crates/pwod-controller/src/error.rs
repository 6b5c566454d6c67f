//! Error types for the controller crate.

use kube::runtime::watcher;
use thiserror::Error;

/// Errors that stop the controller.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Listing workloads failed before the first complete sync.
    #[error("initial workload listing failed: {0}")]
    InitialSync(#[source] watcher::Error),

    /// The watch kept failing after the initial sync.
    #[error("watch failed {errors} consecutive times, last error: {last}")]
    WatchBudgetExhausted {
        /// Number of consecutive failures.
        errors: u32,
        /// The last error reported by the watcher.
        last: String,
    },

    /// The watch stream ended without the controller being cancelled.
    #[error("watch stream ended unexpectedly")]
    WatchEnded,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Check if restarting the controller might succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::InitialSync(_) | Self::WatchBudgetExhausted { .. } | Self::WatchEnded
        )
    }
}

/// A specialized Result type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
