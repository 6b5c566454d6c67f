//! Controller configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// Configuration for the pod lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Only watch this namespace; all namespaces when unset.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Label selector applied to the pod watch.
    #[serde(default)]
    pub label_selector: Option<String>,
    /// Field selector applied to the pod watch (e.g. `spec.nodeName=node-a`).
    #[serde(default)]
    pub field_selector: Option<String>,
    /// Capacity of the channel between the watch and the dispatch loop.
    #[serde(default = "ControllerConfig::default_event_buffer")]
    pub event_buffer: usize,
    /// Consecutive watch errors tolerated after the initial sync.
    #[serde(default = "ControllerConfig::default_watch_error_budget")]
    pub watch_error_budget: u32,
}

impl ControllerConfig {
    const fn default_event_buffer() -> usize {
        1024
    }

    const fn default_watch_error_budget() -> u32 {
        5
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the event buffer is zero or a selector is blank.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(ControllerError::Config(
                "event buffer must be at least 1".to_string(),
            ));
        }
        for (name, selector) in [
            ("namespace", &self.namespace),
            ("label selector", &self.label_selector),
            ("field selector", &self.field_selector),
        ] {
            if selector.as_deref().is_some_and(|s| s.trim().is_empty()) {
                return Err(ControllerError::Config(format!("{name} must not be blank")));
            }
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            field_selector: None,
            event_buffer: Self::default_event_buffer(),
            watch_error_budget: Self::default_watch_error_budget(),
        }
    }
}
