//! Proactive renewal timer
//!
//! Holds at most one pending timer. Arming computes the delay from the
//! credential's expiry claim, aborts whatever timer was live and spawns a new
//! one. When the timer is due it spawns `on_due` as its own task and finishes,
//! so the callback can re-arm the scheduler without aborting itself.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::Credential;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delay before a proactive renewal: `max(expires_at - lead - now, min)`.
pub fn renewal_delay(expires_at: u64, now: u64, lead: Duration, min: Duration) -> Duration {
    Duration::from_secs(expires_at.saturating_sub(now))
        .saturating_sub(lead)
        .max(min)
}

struct ArmedTimer {
    handle: JoinHandle<()>,
    delay: Duration,
}

/// One-shot, re-armable timer that fires shortly before credential expiry.
pub struct ExpiryScheduler {
    lead_time: Duration,
    min_delay: Duration,
    clock: fn() -> u64,
    timer: Mutex<Option<ArmedTimer>>,
}

impl ExpiryScheduler {
    pub fn new(lead_time: Duration, min_delay: Duration, clock: fn() -> u64) -> Self {
        Self {
            lead_time,
            min_delay,
            clock,
            timer: Mutex::new(None),
        }
    }

    /// Replace any live timer with one for `credential`.
    ///
    /// A credential without an expiry claim leaves the scheduler disarmed.
    /// Returns the delay that was armed.
    pub fn arm<F, Fut>(&self, credential: &Credential, on_due: F) -> Option<Duration>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut timer = self.lock_timer();
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }

        let Some(expires_at) = credential.expires_at() else {
            debug!("credential has no expiry claim, proactive renewal disabled");
            return None;
        };

        let delay = renewal_delay(expires_at, (self.clock)(), self.lead_time, self.min_delay);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("renewal timer due");
            tokio::spawn(on_due());
        });
        debug!(delay_secs = delay.as_secs(), expires_at, "renewal timer armed");

        *timer = Some(ArmedTimer { handle, delay });
        Some(delay)
    }

    /// Cancel the live timer, if any. A disarmed timer never fires.
    pub fn disarm(&self) {
        if let Some(previous) = self.lock_timer().take() {
            previous.handle.abort();
            debug!("renewal timer disarmed");
        }
    }

    /// Whether a timer is pending and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Delay the pending timer was armed with.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.lock_timer()
            .as_ref()
            .filter(|t| !t.handle.is_finished())
            .map(|t| t.delay)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<ArmedTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
