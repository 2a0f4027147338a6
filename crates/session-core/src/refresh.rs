//! Single-flight credential renewal
//!
//! At most one renewal call is in flight at any time. The first caller of
//! `force_refresh` creates the operation and spawns the renewal on its own
//! task; every caller that arrives while it runs registers a waiter and
//! receives a clone of the same outcome. The slot mutex is the only
//! synchronization for check-and-create and for draining, and it is never
//! held across an await.
//!
//! Settling runs under the session lock:
//! - success stores the credential, re-arms the expiry timer and confirms the
//!   session
//! - failure clears the store, disarms the timer and forces a logout, which
//!   emits the forced-logout signal exactly once
//! - if the session epoch moved while the renewal was in flight (logout or a
//!   new login), the result is discarded and waiters get `SessionEnded`
//! - a renewal task that panics settles as a failure
//!
//! A renewal never starts from `Unauthenticated`: once a failure has ended
//! the epoch, only a new login makes renewal possible again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use session_auth::{Credential, TokenStore};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::Transport;

use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::metrics;
use crate::scheduler::ExpiryScheduler;
use crate::state::{SessionEvent, SessionPhase, SessionState};

/// What every waiter of one operation receives.
pub type RefreshOutcome = Result<Credential, RefreshError>;

struct RefreshOperation {
    id: u64,
    /// Session epoch the operation was created in
    epoch: u64,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Deduplicating renewal engine.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    scheduler: Arc<ExpiryScheduler>,
    session: Arc<SessionState>,
    renewal_path: String,
    renewal_timeout: Duration,
    slot: Mutex<Option<RefreshOperation>>,
    next_id: AtomicU64,
    /// Lets timer callbacks and spawned renewals hold the coordinator
    this: Weak<RefreshCoordinator>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        scheduler: Arc<ExpiryScheduler>,
        session: Arc<SessionState>,
        config: &SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            transport,
            store,
            scheduler,
            session,
            renewal_path: config.renewal_path.clone(),
            renewal_timeout: config.renewal_timeout,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    /// Renew the credential, joining the in-flight operation if there is one.
    ///
    /// Dropping the returned future does not cancel the renewal.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        let this = self.this.upgrade().ok_or(RefreshError::Abandoned)?;
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut slot = self.lock_slot();
            match slot.as_mut() {
                Some(operation) => {
                    operation.waiters.push(tx);
                    debug!(
                        operation_id = operation.id,
                        waiters = operation.waiters.len(),
                        "joining in-flight refresh"
                    );
                    metrics::record_refresh_joined();
                    None
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let epoch = self.session.epoch();
                    *slot = Some(RefreshOperation {
                        id,
                        epoch,
                        waiters: vec![tx],
                    });
                    Some((id, epoch))
                }
            }
        };

        if let Some((id, epoch)) = started {
            debug!(operation_id = id, epoch, "starting refresh");
            tokio::spawn(async move {
                let worker = Arc::clone(&this);
                if let Err(e) = tokio::spawn(async move { worker.run(id, epoch).await }).await {
                    warn!(operation_id = id, error = %e, "renewal task failed");
                    this.settle(id, epoch, Err(RefreshError::Abandoned)).await;
                }
            });
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Arm the proactive renewal timer for `credential`.
    pub fn schedule(&self, credential: &Credential) -> Option<Duration> {
        let this = self.this.clone();
        self.scheduler.arm(credential, move || async move {
            let Some(coordinator) = this.upgrade() else {
                return;
            };
            debug!("proactive renewal due");
            if let Err(e) = coordinator.force_refresh().await {
                debug!(error = %e, "proactive renewal did not produce a credential");
            }
        })
    }

    /// Whether a renewal operation is currently in flight.
    pub fn in_flight(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Callers waiting on the in-flight operation.
    pub fn waiting(&self) -> usize {
        self.lock_slot().as_ref().map_or(0, |op| op.waiters.len())
    }

    async fn run(&self, id: u64, epoch: u64) {
        {
            let mut session = self.session.lock().await;
            if session.epoch() != epoch {
                debug!(epoch, "session ended before renewal started");
                metrics::record_refresh("session_ended");
                self.drain(id, Err(RefreshError::SessionEnded));
                return;
            }
            if session.phase() == SessionPhase::Unauthenticated {
                debug!(epoch, "no authenticated session to renew");
                metrics::record_refresh("not_authenticated");
                self.drain(id, Err(RefreshError::NotAuthenticated));
                return;
            }
            session.apply(SessionEvent::RefreshStarted);
        }

        let current = self.store.get().await;
        let renewal = session_auth::renew(
            self.transport.as_ref(),
            &self.renewal_path,
            current.as_ref(),
        );
        let result = match tokio::time::timeout(self.renewal_timeout, renewal).await {
            Ok(Ok(credential)) => Ok(credential),
            Ok(Err(e)) => Err(RefreshError::Renewal(e)),
            Err(_) => Err(RefreshError::Timeout(self.renewal_timeout)),
        };

        self.settle(id, epoch, result).await;
    }

    /// Apply the result to the session and release every waiter.
    ///
    /// Waiters are drained before the session lock is released, so a caller
    /// that arrives after the outcome is decided always starts a new operation.
    async fn settle(&self, id: u64, epoch: u64, result: RefreshOutcome) {
        let mut session = self.session.lock().await;
        if !self.owns_slot(id) {
            return;
        }

        let outcome = if session.epoch() != epoch {
            info!(
                epoch,
                current_epoch = session.epoch(),
                "session ended while renewal was in flight, discarding result"
            );
            metrics::record_refresh("session_ended");
            Err(RefreshError::SessionEnded)
        } else {
            match result {
                Ok(credential) => {
                    if let Err(e) = self.store.set(credential.clone()).await {
                        warn!(error = %e, "failed to persist renewed credential");
                    }
                    let delay = self.schedule(&credential);
                    session.apply(SessionEvent::RefreshSucceeded {
                        subject: credential.subject().map(str::to_string),
                    });
                    info!(
                        epoch,
                        delay_secs = delay.map(|d| d.as_secs()),
                        "credential renewed"
                    );
                    metrics::record_refresh("success");
                    Ok(credential)
                }
                Err(e) => {
                    if let Err(clear_err) = self.store.clear().await {
                        warn!(error = %clear_err, "failed to clear credential after renewal failure");
                    }
                    self.scheduler.disarm();
                    session.apply(SessionEvent::RefreshFailed {
                        reason: e.to_string(),
                    });
                    metrics::record_refresh("failure");
                    Err(e)
                }
            }
        };

        self.drain(id, outcome);
    }

    fn owns_slot(&self, id: u64) -> bool {
        self.lock_slot().as_ref().is_some_and(|op| op.id == id)
    }

    /// Clear the slot and hand the outcome to every waiter of operation `id`.
    fn drain(&self, id: u64, outcome: RefreshOutcome) {
        let Some(operation) = self.lock_slot().take_if(|op| op.id == id) else {
            return;
        };
        debug!(
            operation_id = id,
            waiters = operation.waiters.len(),
            ok = outcome.is_ok(),
            "refresh settled"
        );
        for waiter in operation.waiters {
            // A waiter whose caller went away is not an error
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<RefreshOperation>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
