//! Error types for the session coordinator

use std::time::Duration;

use transport::{ApiResponse, TransportError};

/// Why a refresh operation did not produce a credential.
///
/// Every waiter that joined the operation receives a clone of the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Renewal(#[from] session_auth::Error),

    #[error("renewal timed out after {0:?}")]
    Timeout(Duration),

    #[error("session ended while renewal was in flight")]
    SessionEnded,

    #[error("no authenticated session to renew")]
    NotAuthenticated,

    #[error("renewal task stopped before settling")]
    Abandoned,
}

/// Final outcome of a request sent through the gate, when it is not a
/// response to hand back.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The last response was a 401 and no further recovery is allowed: the
    /// request already had its one retry, or it targeted the renewal endpoint.
    #[error("request unauthorized ({})", .0.status)]
    Unauthorized(ApiResponse),

    #[error("credential renewal failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error("held credential is not a valid header value")]
    InvalidCredential,
}

/// Errors from session transitions (login, logout, resume).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential store error: {0}")]
    Store(#[from] session_auth::Error),

    #[error("credential is empty")]
    EmptyCredential,
}

/// Result alias for session transitions.
pub type Result<T> = std::result::Result<T, Error>;
