//! HTTP error responses
//!
//! Gate failures and session transition failures become JSON bodies of the
//! form `{"error":{"type":"...","message":"...","request_id":"..."}}`. A 401
//! that survived its one retry is not an error here: the upstream response is
//! returned as it came.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use session_core::GateError;

/// JSON error body with a machine-readable `type`.
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: Option<&str>,
) -> Response {
    let mut error = serde_json::json!({
        "type": error_type,
        "message": message,
    });
    if let Some(id) = request_id {
        error["request_id"] = serde_json::Value::String(id.to_string());
    }
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({ "error": error }).to_string(),
    )
        .into_response()
}

/// Classify a gate failure for the `session_gateway_upstream_errors_total`
/// counter. `None` when the failure carries an upstream response.
pub fn error_kind(err: &GateError) -> Option<&'static str> {
    match err {
        GateError::Transport(e) if e.is_timeout() => Some("timeout"),
        GateError::Transport(_) => Some("transport"),
        GateError::Refresh(_) => Some("session_expired"),
        GateError::InvalidCredential => Some("invalid_credential"),
        GateError::Unauthorized(_) => None,
    }
}

/// Map a gate failure that has no upstream response to send back.
pub fn gate_error_response(err: &GateError, request_id: &str) -> Response {
    let message = err.to_string();
    let (status, error_type) = match err {
        GateError::Transport(e) if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
        GateError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        GateError::Refresh(_) => (StatusCode::UNAUTHORIZED, "session_expired"),
        GateError::InvalidCredential => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_credential"),
        GateError::Unauthorized(response) => (response.status, "unauthorized"),
    };
    error_response(status, error_type, &message, Some(request_id))
}

/// Failure of a `/session` route.
#[derive(Debug)]
pub struct SessionRouteError(pub session_core::Error);

impl From<session_core::Error> for SessionRouteError {
    fn from(err: session_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for SessionRouteError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            session_core::Error::EmptyCredential => (StatusCode::BAD_REQUEST, "invalid_request"),
            session_core::Error::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };
        error_response(status, error_type, &self.0.to_string(), None)
    }
}
