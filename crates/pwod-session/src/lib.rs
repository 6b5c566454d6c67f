//! Simulated control-plane sessions for pwod workloads.
//!
//! This crate owns the per-workload [`SessionHandle`] and the seam to the
//! component that actually talks to the control plane:
//!
//! - [`SessionProvider`] / [`ActiveSession`]: establish and release sessions
//! - [`SessionParams`]: what a provider is told about a workload
//! - [`AuthOptions`]: which authentication mechanism sessions use
//! - [`DialSessionProvider`]: one TCP connection to the control plane per session
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pwod_core::{classify, WorkloadRecord};
//! use pwod_session::{DialConfig, DialSessionProvider, SessionContext, SessionHandle, SessionSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(DialSessionProvider::new(DialConfig::new("localhost:15010")));
//! let ctx = SessionContext::new(provider, SessionSettings::default(), CancellationToken::new());
//!
//! let record = WorkloadRecord::new("6b1d", "default", "ingress").with_containers(1, 0);
//! let mut handle = SessionHandle::new(classify(&record));
//!
//! handle.start(&ctx).await?;
//! handle.cleanup(&ctx).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod dial;
pub mod error;
pub mod handle;
pub mod params;
pub mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use auth::{AuthOptions, AuthType, SessionCredentials};
pub use dial::{DialConfig, DialSessionProvider};
pub use error::{Result, SessionError};
pub use handle::{HandleState, SessionHandle};
pub use params::{SessionParams, SessionSettings};
pub use provider::{ActiveSession, SessionContext, SessionProvider};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockSessionProvider;
