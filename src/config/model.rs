//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a doclock repository.
///
/// This struct represents the contents of `doclock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Store settings
    // =========================================================================
    /// Root directory of the file store.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Collection used when the CLI is not given one.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Milliseconds a writer waits for the file store's collection mutex.
    #[serde(default = "default_store_mutex_timeout_ms")]
    pub store_mutex_timeout_ms: u64,

    // =========================================================================
    // Lease settings
    // =========================================================================
    /// Lease length used when an acquire does not specify one.
    #[serde(default = "default_lease_seconds")]
    pub default_lease_seconds: u64,

    /// First pause between `wait` attempts.
    #[serde(default = "default_wait_poll_interval_ms")]
    pub wait_poll_interval_ms: u64,

    /// Longest pause between `wait` attempts; the interval doubles up to this.
    #[serde(default = "default_wait_max_backoff_ms")]
    pub wait_max_backoff_ms: u64,

    /// Forced unlock count at which an entity is reported as chronically failing.
    #[serde(default = "default_unlock_warn_threshold")]
    pub unlock_warn_threshold: u32,

    // =========================================================================
    // Audit settings
    // =========================================================================
    /// NDJSON file receiving lock events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            collection: default_collection(),
            store_mutex_timeout_ms: default_store_mutex_timeout_ms(),
            default_lease_seconds: default_lease_seconds(),
            wait_poll_interval_ms: default_wait_poll_interval_ms(),
            wait_max_backoff_ms: default_wait_max_backoff_ms(),
            unlock_warn_threshold: default_unlock_warn_threshold(),
            events_log: None,
        }
    }
}
