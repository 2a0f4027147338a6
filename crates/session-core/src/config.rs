//! Coordinator settings

use std::time::Duration;

use session_auth::{
    DEFAULT_LEAD_TIME, DEFAULT_MIN_DELAY, DEFAULT_RENEWAL_PATH, DEFAULT_RENEWAL_TIMEOUT, unix_now,
};

/// Settings for one `SessionCoordinator`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Proactive renewal fires this long before the credential expires
    pub lead_time: Duration,
    /// Floor for any scheduled renewal delay
    pub min_delay: Duration,
    /// Renewal endpoint, relative to the API base
    pub renewal_path: String,
    /// Upper bound on the renewal round trip; expiry counts as a failed renewal
    pub renewal_timeout: Duration,
    /// Wall clock in unix seconds, compared against credential expiry claims
    pub clock: fn() -> u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lead_time: DEFAULT_LEAD_TIME,
            min_delay: DEFAULT_MIN_DELAY,
            renewal_path: DEFAULT_RENEWAL_PATH.to_string(),
            renewal_timeout: DEFAULT_RENEWAL_TIMEOUT,
            clock: unix_now,
        }
    }
}
