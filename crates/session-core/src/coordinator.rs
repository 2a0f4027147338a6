//! Session coordinator facade
//!
//! Owns the token store, expiry scheduler, refresh coordinator, session state
//! and request gate, and wires them together. One coordinator per session;
//! share it by `Arc`.
//!
//! Lock order, outermost first: session, token store, scheduler timer,
//! refresh slot. The last two are std mutexes and never held across an await.

use std::sync::Arc;

use session_auth::{Credential, TokenStore};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::config::SessionConfig;
use crate::error::{Error, GateError, RefreshError, Result};
use crate::gate::{RequestGate, renewal_path_predicate};
use crate::refresh::RefreshCoordinator;
use crate::scheduler::ExpiryScheduler;
use crate::state::{
    ForcedLogout, Identity, SessionEvent, SessionPhase, SessionSnapshot, SessionState,
};

pub struct SessionCoordinator {
    store: Arc<TokenStore>,
    scheduler: Arc<ExpiryScheduler>,
    session: Arc<SessionState>,
    refresh: Arc<RefreshCoordinator>,
    gate: RequestGate,
    clock: fn() -> u64,
}

impl SessionCoordinator {
    pub fn new(transport: Arc<dyn Transport>, store: TokenStore, config: SessionConfig) -> Self {
        let store = Arc::new(store);
        let scheduler = Arc::new(ExpiryScheduler::new(
            config.lead_time,
            config.min_delay,
            config.clock,
        ));
        let session = Arc::new(SessionState::new());
        let refresh = RefreshCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Arc::clone(&session),
            &config,
        );
        let gate = RequestGate::new(
            transport,
            Arc::clone(&store),
            Arc::clone(&session),
            Arc::clone(&refresh),
            renewal_path_predicate(config.renewal_path.as_str()),
        );
        Self {
            store,
            scheduler,
            session,
            refresh,
            gate,
            clock: config.clock,
        }
    }

    /// Pick up a credential persisted by a previous process.
    ///
    /// Identity comes from the credential subject. An expired credential is
    /// kept and renewed once the minimum delay elapses.
    pub async fn resume(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        if session.phase() != SessionPhase::Unauthenticated {
            return session.snapshot();
        }
        let Some(credential) = self.store.get().await else {
            info!("no persisted session to resume");
            return session.snapshot();
        };
        if credential.is_expired_at((self.clock)()) {
            warn!(
                expires_at = credential.expires_at(),
                "persisted credential already expired, renewing right away"
            );
        }

        session.apply(SessionEvent::Resumed(
            credential.subject().map(Identity::new),
        ));
        let delay = self.refresh.schedule(&credential);
        info!(
            epoch = session.epoch(),
            delay_secs = delay.map(|d| d.as_secs()),
            "resumed persisted session"
        );
        session.snapshot()
    }

    /// Start a new session epoch with `credential`.
    pub async fn login(&self, identity: Identity, credential: Credential) -> Result<SessionSnapshot> {
        if credential.raw().trim().is_empty() {
            return Err(Error::EmptyCredential);
        }

        let mut session = self.session.lock().await;
        if let Err(e) = self.store.set(credential.clone()).await {
            warn!(error = %e, "failed to persist login credential");
            if let Err(clear_err) = self.store.clear().await {
                warn!(error = %clear_err, "failed to roll back login credential");
            }
            return Err(e.into());
        }

        let user_id = identity.user_id.clone();
        session.apply(SessionEvent::LoggedIn(identity));
        let delay = self.refresh.schedule(&credential);
        info!(
            epoch = session.epoch(),
            user_id = %user_id,
            delay_secs = delay.map(|d| d.as_secs()),
            "session logged in"
        );
        Ok(session.snapshot())
    }

    /// End the current session. Idempotent.
    ///
    /// An in-flight renewal is left to finish, but its result is discarded.
    pub async fn logout(&self) -> Result<SessionSnapshot> {
        let mut session = self.session.lock().await;
        let cleared = self.store.clear().await;
        self.scheduler.disarm();
        session.apply(SessionEvent::LoggedOut);
        cleared?;
        Ok(session.snapshot())
    }

    /// Send a request through the gate.
    pub async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, GateError> {
        self.gate.send(request).await
    }

    /// Renew now, joining any in-flight renewal.
    pub async fn force_refresh(&self) -> std::result::Result<Credential, RefreshError> {
        self.refresh.force_refresh().await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    pub fn forced_logouts(&self) -> broadcast::Receiver<ForcedLogout> {
        self.session.forced_logouts()
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    pub fn refresh(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.store.get().await
    }

    /// Stop proactive renewal. The persisted credential is kept for the next
    /// process to resume.
    pub fn shutdown(&self) {
        self.scheduler.disarm();
    }
}
