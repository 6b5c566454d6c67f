//! Common error types for pwod.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing core types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A workload identifier was empty.
    #[error("workload uid must not be empty")]
    EmptyUid,
}
