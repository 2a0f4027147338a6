//! `/session` routes and the forced-logout watcher

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use session_auth::Credential;
use session_core::{ForcedLogout, Identity, SessionCoordinator, SessionSnapshot};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::AppState;
use crate::error::SessionRouteError;

/// Body of `POST /session/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identity: Identity,
    pub credential: String,
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.coordinator.snapshot())
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionSnapshot>, SessionRouteError> {
    let credential = Credential::parse(body.credential.trim());
    let snapshot = state.coordinator.login(body.identity, credential).await?;
    Ok(Json(snapshot))
}

pub async fn logout(
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, SessionRouteError> {
    Ok(Json(state.coordinator.logout().await?))
}

/// Log every forced logout until the coordinator goes away.
///
/// Whatever consumes the gateway learns about the logout from the
/// `session_expired` error on its next request or from `GET /session`.
pub fn spawn_forced_logout_watcher(
    coordinator: &Arc<SessionCoordinator>,
) -> tokio::task::JoinHandle<()> {
    let mut signals = coordinator.forced_logouts();
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(ForcedLogout { epoch, reason }) => {
                    warn!(epoch, reason = %reason, "session force-logged out");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "forced-logout watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("forced-logout channel closed");
                    break;
                }
            }
        }
    })
}
