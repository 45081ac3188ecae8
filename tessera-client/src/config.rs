use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client settings. All fields have working defaults so a config file only
/// needs to override what it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on concurrent storage node requests per operation.
    pub max_concurrent_requests: usize,
    /// Per-request timeout at the transport boundary, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum object ids per chain `get_objects` call.
    pub max_object_batch_size: usize,
    /// Attempts for storing metadata while a node has not yet observed the
    /// blob's registration.
    pub metadata_write_attempts: usize,
    /// Delay between metadata write attempts, in milliseconds.
    pub metadata_retry_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 32,
            request_timeout_secs: 30,
            max_object_batch_size: 50,
            metadata_write_attempts: 3,
            metadata_retry_delay_ms: 1000,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn metadata_retry_delay(&self) -> Duration {
        Duration::from_millis(self.metadata_retry_delay_ms)
    }
}
