//! Pod lifecycle controller for pwod.
//!
//! Watches workloads, classifies them, and keeps one simulated control-plane
//! session per proxy-bearing workload:
//!
//! - [`Controller`]: runs a [`WatchSource`] and dispatches its events
//! - [`EventDispatcher`]: applies events to the registry in delivery order
//! - [`LifecycleRegistry`]: the concurrency-safe map of sessions
//! - [`KubeWatchSource`]: pods from the Kubernetes API
//! - [`ChannelWatchSource`]: events from an in-process channel
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pwod_controller::{Controller, ControllerConfig, KubeWatchSource};
//! use pwod_session::{DialConfig, DialSessionProvider, SessionSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let config = ControllerConfig::default();
//! let source = KubeWatchSource::new(client, &config);
//! let provider = Arc::new(DialSessionProvider::new(DialConfig::new("localhost:15010")));
//!
//! let controller = Controller::new(source, provider, SessionSettings::default(), config);
//! controller.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod k8s;
pub mod pod;
pub mod registry;
pub mod watch;

pub use config::ControllerConfig;
pub use controller::Controller;
pub use dispatch::EventDispatcher;
pub use error::{ControllerError, Result};
pub use k8s::{KubeWatchSource, PodEventTranslator};
pub use pod::workload_record;
pub use registry::{
    Admission, LifecycleRegistry, PendingStart, Release, Settlement, SlotPhase, SlotSummary,
};
pub use watch::{ChannelWatchSource, WatchEvent, WatchSource};
