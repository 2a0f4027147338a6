//! Session state machine and its observable holder
//!
//! `transition` is a pure function: it receives the current phase and an
//! event and returns (new_phase, action). `SessionState` owns the phase,
//! applies transitions under a lock, executes the bookkeeping each action
//! implies (epoch changes, forced-logout signal) and publishes a snapshot to
//! observers after every change.
//!
//! Phases:
//! - Unauthenticated → Authenticated (login / resume)
//! - Authenticated → Refreshing (401 observed or expiry timer due)
//! - Refreshing → Refreshing (further triggers join the same operation)
//! - Refreshing → Authenticated (renewal succeeded)
//! - Refreshing → Unauthenticated (renewal failed: forced logout)
//! - Unauthenticated stays put on refresh events; only login or resume
//!   leaves it
//! - any → Unauthenticated (logout)
//!
//! Every login and every logout, forced or not, starts a new epoch. A refresh
//! records the epoch it began in and only settles into the session if the
//! epoch is unchanged, so an old renewal can never revive a session that was
//! ended while it was in flight.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tracing::{info, warn};

/// Capacity of the forced-logout broadcast. At most one signal is sent per
/// failed refresh, so slow consumers only lag under a logout storm.
const FORCED_LOGOUT_CAPACITY: usize = 16;

/// Authentication phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

/// Who the session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }
}

/// Events that drive phase transitions.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Explicit login with a fresh credential
    LoggedIn(Identity),
    /// Persisted credential picked up at process start
    Resumed(Option<Identity>),
    /// A refresh operation began
    RefreshStarted,
    /// Renewal returned a credential; `subject` fills a missing identity
    RefreshSucceeded { subject: Option<String> },
    /// Renewal failed; terminal for the epoch
    RefreshFailed { reason: String },
    /// Explicit logout or teardown
    LoggedOut,
}

/// Bookkeeping the holder performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Begin a new epoch with the given identity
    StartEpoch,
    /// End the current epoch quietly
    EndEpoch,
    /// End the current epoch and emit the forced-logout signal
    ForcedLogout,
    None,
}

/// Handle a transition. Pure function: no I/O.
pub fn transition(phase: SessionPhase, event: &SessionEvent) -> (SessionPhase, SessionAction) {
    use SessionAction as A;
    use SessionPhase as P;

    match (phase, event) {
        (_, SessionEvent::LoggedIn(_) | SessionEvent::Resumed(_)) => {
            (P::Authenticated, A::StartEpoch)
        }

        (_, SessionEvent::LoggedOut) => (P::Unauthenticated, A::EndEpoch),

        (P::Authenticated | P::Refreshing, SessionEvent::RefreshStarted) => {
            (P::Refreshing, A::None)
        }

        // Nothing to renew once the epoch has ended
        (P::Unauthenticated, SessionEvent::RefreshStarted) => (P::Unauthenticated, A::None),

        (P::Refreshing | P::Authenticated, SessionEvent::RefreshSucceeded { .. }) => {
            (P::Authenticated, A::None)
        }

        (P::Refreshing | P::Authenticated, SessionEvent::RefreshFailed { .. }) => {
            (P::Unauthenticated, A::ForcedLogout)
        }

        // A settled refresh cannot revive a logged-out session
        (P::Unauthenticated, SessionEvent::RefreshSucceeded { .. })
        | (P::Unauthenticated, SessionEvent::RefreshFailed { .. }) => {
            (P::Unauthenticated, A::None)
        }
    }
}

/// Observable view of the session, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub epoch: u64,
}

/// Process-wide signal that a failed renewal ended the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForcedLogout {
    /// Epoch that was ended
    pub epoch: u64,
    pub reason: String,
}

struct SessionInner {
    phase: SessionPhase,
    authenticated: bool,
    identity: Option<Identity>,
}

/// Owner of the session phase, identity and epoch.
pub struct SessionState {
    inner: Mutex<SessionInner>,
    /// Only written while `inner` is locked; readable without the lock
    epoch: AtomicU64,
    snapshots: watch::Sender<SessionSnapshot>,
    forced_logout: broadcast::Sender<ForcedLogout>,
}

impl SessionState {
    pub fn new() -> Self {
        let initial = SessionSnapshot {
            authenticated: false,
            phase: SessionPhase::Unauthenticated,
            identity: None,
            epoch: 0,
        };
        let (snapshots, _) = watch::channel(initial);
        let (forced_logout, _) = broadcast::channel(FORCED_LOGOUT_CAPACITY);
        Self {
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Unauthenticated,
                authenticated: false,
                identity: None,
            }),
            epoch: AtomicU64::new(0),
            snapshots,
            forced_logout,
        }
    }

    /// Lock the session for a multi-step transition.
    ///
    /// Holders may await store writes while locked; that is what keeps a
    /// logout and a settling refresh from interleaving.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            inner: self.inner.lock().await,
            state: self,
        }
    }

    /// Epoch as of the last completed transition.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Phase as of the last completed transition.
    pub fn phase(&self) -> SessionPhase {
        self.snapshots.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn forced_logouts(&self) -> broadcast::Receiver<ForcedLogout> {
        self.forced_logout.subscribe()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the session for the duration of a transition.
pub struct SessionGuard<'a> {
    inner: MutexGuard<'a, SessionInner>,
    state: &'a SessionState,
}

impl SessionGuard<'_> {
    pub fn epoch(&self) -> u64 {
        self.state.epoch.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase
    }

    /// Apply an event, perform its bookkeeping and publish the new snapshot.
    pub fn apply(&mut self, event: SessionEvent) -> SessionAction {
        let (phase, action) = transition(self.inner.phase, &event);
        let epoch = self.epoch();
        self.inner.phase = phase;

        match (&action, event) {
            (SessionAction::StartEpoch, SessionEvent::LoggedIn(identity)) => {
                self.start_epoch(epoch, Some(identity));
            }
            (SessionAction::StartEpoch, SessionEvent::Resumed(identity)) => {
                self.start_epoch(epoch, identity);
            }
            (SessionAction::EndEpoch, _) => {
                self.end_epoch(epoch);
                info!(epoch, "session logged out");
            }
            (SessionAction::ForcedLogout, SessionEvent::RefreshFailed { reason }) => {
                self.end_epoch(epoch);
                warn!(epoch, reason = %reason, "renewal failed, forcing logout");
                crate::metrics::record_forced_logout();
                // No receivers is fine: nobody is listening for the signal
                let _ = self
                    .state
                    .forced_logout
                    .send(ForcedLogout { epoch, reason });
            }
            (SessionAction::None, SessionEvent::RefreshSucceeded { subject })
                if phase == SessionPhase::Authenticated =>
            {
                self.inner.authenticated = true;
                if self.inner.identity.is_none() {
                    self.inner.identity = subject.map(Identity::new);
                }
            }
            _ => {}
        }

        self.publish();
        action
    }

    /// Snapshot of the state as currently held.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            authenticated: self.inner.authenticated,
            phase: self.inner.phase,
            identity: self.inner.identity.clone(),
            epoch: self.epoch(),
        }
    }

    fn start_epoch(&mut self, epoch: u64, identity: Option<Identity>) {
        self.inner.authenticated = true;
        self.inner.identity = identity;
        self.state.epoch.store(epoch + 1, Ordering::Release);
    }

    fn end_epoch(&mut self, epoch: u64) {
        self.inner.authenticated = false;
        self.inner.identity = None;
        self.state.epoch.store(epoch + 1, Ordering::Release);
    }

    fn publish(&self) {
        self.state.snapshots.send_replace(self.snapshot());
    }
}
