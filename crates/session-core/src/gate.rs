//! Request gate
//!
//! Every outbound call passes through here. The gate attaches the current
//! credential, dispatches, and on a 401 drives at most one coordinated
//! renew-and-replay. Transport errors and every status other than 401 pass
//! through untouched.
//!
//! The replay marker is a local `retried` flag: the request itself is never
//! mutated, so callers can reuse it freely.
//!
//! A 401 only drives a renewal while the session that was live when the
//! request went out is still live. After a logout or a failed renewal, late
//! 401s end with an error instead of starting another renewal.

use std::sync::Arc;

use session_auth::{Credential, TokenStore};
use tracing::debug;
use transport::{ApiRequest, ApiResponse, ResponseClass, Transport};

use crate::error::{GateError, RefreshError};
use crate::metrics;
use crate::refresh::RefreshCoordinator;
use crate::state::{SessionPhase, SessionState};

/// Decides whether a request targets the renewal endpoint. Such requests are
/// never renewed on 401, so a rejected renewal cannot recurse.
pub type RenewalPredicate = Arc<dyn Fn(&ApiRequest) -> bool + Send + Sync>;

/// Match requests whose route (path without query) equals `path`.
pub fn renewal_path_predicate(path: impl Into<String>) -> RenewalPredicate {
    let path = path.into();
    Arc::new(move |request: &ApiRequest| request.route() == path)
}

pub struct RequestGate {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    session: Arc<SessionState>,
    refresh: Arc<RefreshCoordinator>,
    is_renewal: RenewalPredicate,
}

impl RequestGate {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        session: Arc<SessionState>,
        refresh: Arc<RefreshCoordinator>,
        is_renewal: RenewalPredicate,
    ) -> Self {
        Self {
            transport,
            store,
            session,
            refresh,
            is_renewal,
        }
    }

    /// Send a request with the current credential attached.
    ///
    /// A 401 response triggers one shared renewal and one replay. The result
    /// of the replay is final: a second 401 comes back as
    /// `GateError::Unauthorized`.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GateError> {
        let result = self.dispatch(request, false).await;
        metrics::record_gate_request(match &result {
            Ok(_) => "ok",
            Err(GateError::Unauthorized(_)) => "unauthorized",
            Err(GateError::Transport(_)) => "transport_error",
            Err(GateError::Refresh(_)) => "refresh_failed",
            Err(GateError::InvalidCredential) => "invalid_credential",
        });
        result
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        mut retried: bool,
    ) -> Result<ApiResponse, GateError> {
        let epoch = self.session.epoch();
        let mut credential = self.store.get().await;

        loop {
            let outbound = request
                .authorized(credential.as_ref().map(Credential::raw))
                .ok_or(GateError::InvalidCredential)?;
            let response = self.transport.send(&outbound).await?;

            if response.class() != ResponseClass::AuthorizationFailure {
                return Ok(response);
            }
            if retried || (self.is_renewal)(request) {
                debug!(
                    route = request.route(),
                    retried, "authorization failure is final"
                );
                return Err(GateError::Unauthorized(response));
            }

            if self.session.epoch() != epoch {
                debug!(route = request.route(), epoch, "session ended while request was in flight");
                return Err(RefreshError::SessionEnded.into());
            }
            if self.session.phase() == SessionPhase::Unauthenticated {
                debug!(route = request.route(), "401 without a session, not renewing");
                return Err(RefreshError::NotAuthenticated.into());
            }

            retried = true;
            metrics::record_gate_retry();
            credential = match self.store.get().await {
                // Another caller renewed while this request was in flight
                Some(latest) if credential.as_ref() != Some(&latest) => {
                    debug!(route = request.route(), "credential changed in flight, replaying");
                    Some(latest)
                }
                _ => {
                    debug!(route = request.route(), "401 received, renewing before replay");
                    Some(self.refresh.force_refresh().await?)
                }
            };
        }
    }
}
