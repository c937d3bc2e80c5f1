//! Config loading, validation, and conversion helpers.

use super::model::Config;
use super::types::MAX_LEASE_SECONDS;
use crate::error::{DocLockError, Result};
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            DocLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path` if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            DocLockError::UserError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            DocLockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `default_lease_seconds`, `wait_poll_interval_ms`, `unlock_warn_threshold`
    ///   and `store_mutex_timeout_ms` must be positive
    /// - `default_lease_seconds` must not exceed [`MAX_LEASE_SECONDS`]
    /// - `wait_max_backoff_ms` must not be below `wait_poll_interval_ms`
    /// - `store_dir` and `collection` must be non-empty
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("default_lease_seconds", self.default_lease_seconds),
            ("wait_poll_interval_ms", self.wait_poll_interval_ms),
            ("store_mutex_timeout_ms", self.store_mutex_timeout_ms),
            ("unlock_warn_threshold", u64::from(self.unlock_warn_threshold)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DocLockError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    name
                )));
            }
        }

        if self.default_lease_seconds > MAX_LEASE_SECONDS {
            return Err(DocLockError::UserError(format!(
                "config validation failed: default_lease_seconds ({}) must be at most {}",
                self.default_lease_seconds, MAX_LEASE_SECONDS
            )));
        }

        if self.wait_max_backoff_ms < self.wait_poll_interval_ms {
            return Err(DocLockError::UserError(format!(
                "config validation failed: wait_max_backoff_ms ({}) must be at least wait_poll_interval_ms ({})",
                self.wait_max_backoff_ms, self.wait_poll_interval_ms
            )));
        }

        if self.store_dir.trim().is_empty() {
            return Err(DocLockError::UserError(
                "config validation failed: store_dir must be non-empty".to_string(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(DocLockError::UserError(
                "config validation failed: collection must be non-empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Lease used when an acquire does not specify one.
    pub fn default_lease(&self) -> chrono::Duration {
        // Clamped for configs built without validation.
        let seconds = self.default_lease_seconds.min(MAX_LEASE_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }

    pub fn wait_max_backoff(&self) -> Duration {
        Duration::from_millis(self.wait_max_backoff_ms)
    }

    pub fn store_mutex_timeout(&self) -> Duration {
        Duration::from_millis(self.store_mutex_timeout_ms)
    }
}
