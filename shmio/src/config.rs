//! Segment handle configuration.
//!
//! Loaded from TOML through [`ConfigLoader`](common::config::ConfigLoader):
//!
//! ```toml
//! namespace = "shmio"
//!
//! [shared]
//! log_level = "info"
//! service_name = "camera-producer"
//!
//! [pull]
//! mode = "blocking"            # blocking | polling | non_blocking
//! timeout_ms = 50
//! poll_interval_us = 500
//! cancel_check_interval_ms = 10
//! ```
//!
//! Every field is optional; an empty document yields [`ShmConfig::default`].

use crate::platform::validate_name;
use crate::sync::PullMode;
use common::config::{ConfigError, SharedConfig};
use common::consts::DEFAULT_NAMESPACE;
use common::prelude::{DEFAULT_CANCEL_CHECK_INTERVAL, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for the polling interval (1 s).
pub const POLL_INTERVAL_US_MAX: u64 = 1_000_000;

/// Top-level configuration of a segment handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShmConfig {
    /// Prefix of the shared memory object names (default: `shmio`).
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Logging and service identity.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Behaviour of `pull_data_from_storage` when no new frame is available.
    #[serde(default)]
    pub pull: PullConfig,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            shared: SharedConfig::default(),
            pull: PullConfig::default(),
        }
    }
}

impl ShmConfig {
    /// Config in another namespace, everything else default.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Validate namespace and pull parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name(&self.namespace)
            .map_err(|e| ConfigError::ValidationError(format!("namespace: {e}")))?;
        self.shared.validate()?;
        self.pull.validate()
    }
}

/// How a pull behaves when no new version has been published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullStrategy {
    /// Sleep on the segment's notify word until a push or the timeout.
    #[default]
    Blocking,
    /// Re-check every `poll_interval_us`.
    Polling,
    /// Return immediately.
    NonBlocking,
}

/// `[pull]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullConfig {
    /// Wait strategy (default: blocking).
    #[serde(default)]
    pub mode: PullStrategy,

    /// Timeout used when the caller passes none; absent means wait forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Polling interval [µs] (default: 500).
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,

    /// Slice a cancellable pull waits before re-checking its flag [ms] (default: 10).
    #[serde(default = "default_cancel_check_interval_ms")]
    pub cancel_check_interval_ms: u64,
}

fn default_poll_interval_us() -> u64 {
    DEFAULT_POLL_INTERVAL.as_micros() as u64
}
fn default_cancel_check_interval_ms() -> u64 {
    DEFAULT_CANCEL_CHECK_INTERVAL.as_millis() as u64
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            mode: PullStrategy::default(),
            timeout_ms: None,
            poll_interval_us: default_poll_interval_us(),
            cancel_check_interval_ms: default_cancel_check_interval_ms(),
        }
    }
}

impl PullConfig {
    /// Validate interval bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_us == 0 || self.poll_interval_us > POLL_INTERVAL_US_MAX {
            return Err(ConfigError::ValidationError(format!(
                "poll_interval_us {} out of range [1, {}]",
                self.poll_interval_us, POLL_INTERVAL_US_MAX
            )));
        }
        if self.cancel_check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cancel_check_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Runtime pull mode.
    pub fn pull_mode(&self) -> PullMode {
        match self.mode {
            PullStrategy::Blocking => PullMode::Blocking,
            PullStrategy::Polling => PullMode::Polling {
                interval: Duration::from_micros(self.poll_interval_us),
            },
            PullStrategy::NonBlocking => PullMode::NonBlocking,
        }
    }

    /// Default pull timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Cancellation check slice.
    pub fn cancel_check_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::{ConfigLoader, LogLevel};

    #[test]
    fn test_empty_document_is_default() {
        let config = ShmConfig::from_toml_str("").unwrap();
        assert_eq!(config.namespace, "shmio");
        assert_eq!(config.pull, PullConfig::default());
        assert_eq!(config.pull.pull_mode(), PullMode::Blocking);
        assert_eq!(config.pull.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_document() {
        let config = ShmConfig::from_toml_str(
            r#"
            namespace = "lab"

            [shared]
            log_level = "debug"
            service_name = "camera-producer"

            [pull]
            mode = "polling"
            timeout_ms = 50
            poll_interval_us = 250
            cancel_check_interval_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.namespace, "lab");
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(
            config.pull.pull_mode(),
            PullMode::Polling {
                interval: Duration::from_micros(250)
            }
        );
        assert_eq!(config.pull.timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.pull.cancel_check_interval(), Duration::from_millis(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_blocking_mode_name() {
        let config = ShmConfig::from_toml_str("[pull]\nmode = \"non_blocking\"").unwrap();
        assert_eq!(config.pull.pull_mode(), PullMode::NonBlocking);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ShmConfig::with_namespace("a/b");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.namespace = "ok".to_string();
        config.pull.poll_interval_us = 0;
        assert!(config.validate().is_err());

        config.pull.poll_interval_us = 100;
        config.pull.cancel_check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = ShmConfig::from_toml_str("[pull]\nmode = \"spin\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
