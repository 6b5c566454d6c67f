//! Core types for pwod.
//!
//! This crate provides the foundational types shared by the session and
//! controller crates:
//!
//! - **Identifiers**: [`WorkloadUid`], the stable identity of an observed workload
//! - **Workloads**: the raw [`WorkloadRecord`] read from the cluster and the
//!   immutable [`WorkloadSpec`] derived from it
//! - **Classification**: [`ApplicationType`] and the [`classify`] function
//!
//! # Example
//!
//! ```
//! use pwod_core::{classify, ApplicationType, WorkloadRecord};
//!
//! let record = WorkloadRecord::new("0b6c7a1e", "default", "ingress-gateway")
//!     .with_containers(1, 0);
//!
//! let spec = classify(&record);
//! assert_eq!(spec.app_type, ApplicationType::Gateway);
//! assert!(spec.app_type.has_proxy());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod workload;

pub use error::{CoreError, Result};
pub use ids::WorkloadUid;
pub use workload::{classify, ApplicationType, WorkloadRecord, WorkloadSpec};
