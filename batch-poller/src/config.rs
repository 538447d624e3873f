//! Configuration types for the batch-poller crate
//!
//! This module defines the constructor configuration of a [`BatchPoller`],
//! controlling its base cadence, first-arm jitter, backoff ceiling and
//! diagnostic tracing.
//!
//! [`BatchPoller`]: crate::BatchPoller

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PollerError;

/// Upper bound accepted for `base_time`, `jitter` and `max_delay`: one week
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for a BatchPoller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Diagnostic label attached to every log line
    /// Default: "batch-poller"
    pub name: String,

    /// Default cadence, and the minimum wait before a new item is first checked
    /// Default: 5 seconds
    pub base_time: Duration,

    /// Maximum random offset added to the first arm from idle
    /// Default: 0
    pub jitter: Duration,

    /// Ceiling for the shared delay while collisions keep doubling it
    /// Default: 5 minutes
    pub max_delay: Duration,

    /// Enable debug tracing of fetch and backoff decisions
    /// Default: true
    pub logging: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            name: "batch-poller".to_string(),
            base_time: Duration::from_secs(5),
            jitter: Duration::ZERO,
            max_delay: Duration::from_secs(300), // 5 minutes
            logging: true,
        }
    }
}

impl PollerConfig {
    /// Create a new PollerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a PollerConfig for backends that settle quickly
    pub fn fast() -> Self {
        Self {
            base_time: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Create a PollerConfig for heavily rate-limited backends
    pub fn relaxed() -> Self {
        Self {
            base_time: Duration::from_secs(30),
            jitter: Duration::from_secs(5),
            max_delay: Duration::from_secs(1800), // 30 minutes
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, PollerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PollerError::Configuration(format!("Invalid JSON config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), PollerError> {
        if self.name.trim().is_empty() {
            return Err(PollerError::Configuration(
                "Poller name must not be empty".to_string(),
            ));
        }

        if self.base_time.is_zero() {
            return Err(PollerError::Configuration(
                "Base time must be greater than 0".to_string(),
            ));
        }

        if self.max_delay < self.base_time {
            return Err(PollerError::Configuration(
                "Invalid max delay: must not be less than base time".to_string(),
            ));
        }

        if self.max_delay > MAX_DURATION {
            return Err(PollerError::Configuration(format!(
                "Invalid max delay: must not exceed {MAX_DURATION:?}"
            )));
        }

        if self.jitter > MAX_DURATION {
            return Err(PollerError::Configuration(format!(
                "Invalid jitter: must not exceed {MAX_DURATION:?}"
            )));
        }

        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_time(mut self, base_time: Duration) -> Self {
        self.base_time = base_time;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }
}
