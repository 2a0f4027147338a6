//! Authenticated session coordinator
//!
//! Every outbound API call goes through a `SessionCoordinator`, which attaches
//! the bearer credential, renews it proactively before expiry, and on a 401
//! renews it once and replays the call. Renewal is single-flight: however many
//! requests fail at once, one renewal call is made and its outcome is shared.
//!
//! Session lifecycle:
//! 1. `login()` stores the credential, arms the expiry timer, starts an epoch
//! 2. The timer fires `lead_time` before expiry → `force_refresh()`
//! 3. A request gets 401 → `force_refresh()`, joined by concurrent failures
//! 4. Renewal succeeds → credential replaced, timer re-armed, requests replay
//! 5. Renewal fails → store cleared, timer disarmed, forced-logout signal sent
//! 6. `logout()` ends the epoch; a renewal still in flight is discarded

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod refresh;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::SessionConfig;
pub use coordinator::SessionCoordinator;
pub use error::{Error, GateError, RefreshError, Result};
pub use gate::{RenewalPredicate, RequestGate, renewal_path_predicate};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use scheduler::{ExpiryScheduler, renewal_delay};
pub use state::{
    ForcedLogout, Identity, SessionAction, SessionEvent, SessionPhase, SessionSnapshot,
    SessionState, transition,
};
