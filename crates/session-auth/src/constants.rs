//! Session defaults
//!
//! Values used when configuration leaves a setting out. The gateway config
//! and `SessionConfig::default()` both read from here.

use std::time::Duration;

/// How far ahead of expiry the proactive renewal fires
pub const DEFAULT_LEAD_TIME: Duration = Duration::from_secs(120);

/// Floor for any scheduled renewal delay. Keeps an already-expired credential
/// from re-arming at zero and spinning.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Renewal endpoint, relative to the API base address
pub const DEFAULT_RENEWAL_PATH: &str = "/auth/refresh";

/// Upper bound on a single renewal round trip
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on an ordinary API round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
