//! Transport abstraction for outbound API calls
//!
//! Defines the `Transport` trait that decouples the session coordinator from
//! the HTTP client. `HttpTransport` is the reqwest-backed implementation used
//! in production; tests substitute in-process fakes to count and script calls.
//!
//! Requests carry a path relative to the configured API base address. The
//! transport never interprets status codes: a 401 is a successful round trip
//! from its perspective, and `classify_status` is what the request gate uses
//! to recognize an authorization failure.

pub mod http;

pub use http::HttpTransport;

pub use bytes::Bytes;
pub use reqwest::header;
pub use reqwest::{Method, StatusCode};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::future::Future;
use std::pin::Pin;

/// How the request gate should treat a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx/3xx, pass through
    Success,
    /// Credential invalid or expired (401), drives one renew-and-retry cycle
    AuthorizationFailure,
    /// Any other error status, passed through unchanged
    Failure,
}

/// Classify a response status for the request gate.
///
/// Only 401 signals an expired credential. 403 means the credential is valid
/// but lacks permission, so renewing it would not help.
pub fn classify_status(status: StatusCode) -> ResponseClass {
    if status == StatusCode::UNAUTHORIZED {
        ResponseClass::AuthorizationFailure
    } else if status.is_client_error() || status.is_server_error() {
        ResponseClass::Failure
    } else {
        ResponseClass::Success
    }
}

/// Errors from the transport layer (network, timeout, body read).
///
/// `Clone` so a single renewal failure can be fanned out to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("reading response body failed: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// An outbound API call, addressed relative to the API base.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query, e.g. `/events?page=2`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Copy of this request with `Authorization: Bearer <token>` set, or with
    /// any Authorization header removed when no credential is held.
    ///
    /// Returns `None` if the token contains bytes that are not valid in a
    /// header value.
    pub fn authorized(&self, token: Option<&str>) -> Option<ApiRequest> {
        let mut outbound = self.clone();
        outbound.headers.remove(AUTHORIZATION);
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
            value.set_sensitive(true);
            outbound.headers.insert(AUTHORIZATION, value);
        }
        Some(outbound)
    }

    /// Bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A completed round trip, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn class(&self) -> ResponseClass {
        classify_status(self.status)
    }

    /// Body as UTF-8 text (lossy), for logging and error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over how outbound API calls reach the network.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    /// Dispatch a request exactly as given. Headers are not modified; the
    /// caller attaches credentials.
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_401_is_an_authorization_failure() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            ResponseClass::AuthorizationFailure
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ResponseClass::Failure);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            ResponseClass::Failure
        );
        assert_eq!(classify_status(StatusCode::OK), ResponseClass::Success);
        assert_eq!(classify_status(StatusCode::NO_CONTENT), ResponseClass::Success);
    }

    #[test]
    fn authorized_attaches_bearer() {
        let request = ApiRequest::get("/events");
        let outbound = request.authorized(Some("tok_1")).unwrap();
        assert_eq!(outbound.bearer(), Some("tok_1"));
        // Original is untouched
        assert!(request.bearer().is_none());
    }

    #[test]
    fn authorized_replaces_existing_bearer() {
        let first = ApiRequest::get("/events").authorized(Some("old")).unwrap();
        let second = first.authorized(Some("new")).unwrap();
        assert_eq!(second.bearer(), Some("new"));
        assert_eq!(second.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn authorized_without_token_strips_header() {
        let first = ApiRequest::get("/events").authorized(Some("old")).unwrap();
        let stripped = first.authorized(None).unwrap();
        assert!(stripped.bearer().is_none());
    }

    #[test]
    fn authorized_rejects_invalid_header_bytes() {
        let request = ApiRequest::get("/events");
        assert!(request.authorized(Some("bad\ntoken")).is_none());
    }

    #[test]
    fn route_strips_query() {
        assert_eq!(ApiRequest::get("/auth/refresh?x=1").route(), "/auth/refresh");
        assert_eq!(ApiRequest::get("/passes").route(), "/passes");
    }

    #[test]
    fn timeout_detection() {
        assert!(TransportError::Timeout("10s".into()).is_timeout());
        assert!(!TransportError::Connect("refused".into()).is_timeout());
    }
}
