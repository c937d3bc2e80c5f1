//! Configuration constants and defaults for doclock.

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "doclock.yaml";

/// Longest configurable default lease: one hundred years.
pub const MAX_LEASE_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

// Default value functions for serde
pub(crate) fn default_store_dir() -> String {
    ".doclock/store".to_string()
}
pub(crate) fn default_collection() -> String {
    "entities".to_string()
}
pub(crate) fn default_lease_seconds() -> u64 {
    300
}
pub(crate) fn default_wait_poll_interval_ms() -> u64 {
    100
}
pub(crate) fn default_wait_max_backoff_ms() -> u64 {
    2000
}
pub(crate) fn default_unlock_warn_threshold() -> u32 {
    3
}
pub(crate) fn default_store_mutex_timeout_ms() -> u64 {
    5000
}
