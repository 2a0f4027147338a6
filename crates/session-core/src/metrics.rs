//! Session metrics
//!
//! Counters emitted through the `metrics` facade. The host process decides
//! whether a recorder is installed; without one these calls are no-ops.
//!
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_refresh_joined_total` (counter)
//! - `session_forced_logout_total` (counter)
//! - `session_gate_requests_total` (counter): label `outcome`
//! - `session_gate_retries_total` (counter)

/// Record a settled refresh operation ("success", "failure", "session_ended",
/// "not_authenticated").
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a caller that joined an in-flight refresh instead of starting one.
pub fn record_refresh_joined() {
    metrics::counter!("session_refresh_joined_total").increment(1);
}

pub fn record_forced_logout() {
    metrics::counter!("session_forced_logout_total").increment(1);
}

/// Record how a gated request finished ("ok", "unauthorized",
/// "transport_error", "refresh_failed").
pub fn record_gate_request(outcome: &'static str) {
    metrics::counter!("session_gate_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_gate_retry() {
    metrics::counter!("session_gate_retries_total").increment(1);
}
