//! Session-aware forwarding
//!
//! Turns an inbound request into an `ApiRequest`, sends it through the
//! session coordinator's gate (which attaches the credential and handles the
//! renew-and-replay cycle), and returns the upstream response verbatim.
//! Hop-by-hop headers are stripped in both directions, and any inbound
//! `Authorization` is replaced by the session credential.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::Response;
use session_core::{GateError, SessionCoordinator};
use tracing::{error, instrument, warn};
use transport::{ApiRequest, ApiResponse};

use crate::error::{error_kind, error_response, gate_error_response};

/// Largest inbound body the gateway will buffer
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request counters shared by the proxy and the health endpoint
#[derive(Debug, Clone)]
pub struct ProxyStats {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Decrements the in-flight gauge when the request finishes, however it ends.
struct InFlight(Arc<AtomicU64>);

impl InFlight {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Forward an inbound request through the session gate.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    coordinator: &SessionCoordinator,
    stats: &ProxyStats,
    request: Request<Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    let _in_flight = InFlight::enter(&stats.in_flight);
    stats.requests_total.fetch_add(1, Ordering::Relaxed);
    let method = request.method().to_string();

    let response = match to_api_request(request).await {
        Ok(api_request) => match coordinator.send(&api_request).await {
            Ok(upstream) => into_response(upstream, &request_id),
            Err(GateError::Unauthorized(upstream)) => {
                warn!("request still unauthorized after renewal");
                into_response(upstream, &request_id)
            }
            Err(e) => {
                stats.errors_total.fetch_add(1, Ordering::Relaxed);
                if let Some(kind) = error_kind(&e) {
                    crate::metrics::record_upstream_error(kind);
                }
                error!(error = %e, "gated request failed");
                gate_error_response(&e, &request_id)
            }
        },
        Err(response) => {
            stats.errors_total.fetch_add(1, Ordering::Relaxed);
            response
        }
    };

    crate::metrics::record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn to_api_request(request: Request<Body>) -> Result<ApiRequest, Response> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read request body");
            error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("invalid request body: {e}"),
                None,
            )
        })?;

    let mut api_request = ApiRequest::new(parts.method, path).with_body(body);
    api_request.headers = forwardable(&parts.headers);
    Ok(api_request)
}

/// Inbound headers worth forwarding upstream.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || name == header::HOST || name == header::AUTHORIZATION {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn into_response(upstream: ApiResponse, request_id: &str) -> Response {
    let mut response = Response::builder().status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name.as_str()) && name != header::CONTENT_LENGTH {
            response = response.header(name, value);
        }
    }
    response
        .body(Body::from(upstream.body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "gateway_error",
                &format!("response build error: {e}"),
                Some(request_id),
            )
        })
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("TRANSFER-ENCODING"));
        assert!(is_hop_by_hop("Proxy-Authorization"));
        assert!(!is_hop_by_hop("Content-Type"));
        assert!(!is_hop_by_hop("Authorization"));
    }

    #[test]
    fn inbound_authorization_and_host_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let out = forwardable(&headers);
        assert_eq!(out.len(), 1);
        assert_eq!(out[header::ACCEPT], "application/json");
    }

    #[tokio::test]
    async fn request_conversion_keeps_method_query_and_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/events?draft=true")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"launch"}"#))
            .unwrap();

        let api_request = to_api_request(request).await.unwrap();
        assert_eq!(api_request.method, axum::http::Method::POST);
        assert_eq!(api_request.path, "/events?draft=true");
        assert_eq!(api_request.route(), "/events");
        assert_eq!(&api_request.body[..], br#"{"name":"launch"}"#);
        assert_eq!(api_request.headers["content-type"], "application/json");
    }

    #[test]
    fn upstream_response_is_returned_verbatim() {
        let mut upstream = ApiResponse::new(StatusCode::CREATED, "created");
        upstream
            .headers
            .insert("x-request-cost", HeaderValue::from_static("3"));
        upstream
            .headers
            .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let response = into_response(upstream, "req_1");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-request-cost"], "3");
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
    }
}
