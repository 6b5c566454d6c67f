//! Workload identifier type.
//!
//! Workload identities are assigned by the cluster inventory (for pods, the
//! object `metadata.uid`) and are guaranteed unique by it. They are opaque to
//! pwod: no structure is assumed beyond being non-empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The stable unique identity of an observed workload instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkloadUid(String);

impl WorkloadUid {
    /// Create a `WorkloadUid` without validation.
    ///
    /// Prefer [`WorkloadUid::parse`] for values read from the cluster.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Parse a `WorkloadUid`, rejecting empty strings.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptyUid` if the trimmed input is empty.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyUid);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WorkloadUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkloadUid({})", self.0)
    }
}

impl fmt::Display for WorkloadUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkloadUid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorkloadUid {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WorkloadUid> for String {
    fn from(uid: WorkloadUid) -> Self {
        uid.0
    }
}

impl AsRef<str> for WorkloadUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
