//! In-process API double shared by the session-core tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use session_auth::{DEFAULT_RENEWAL_PATH, TokenStore};
use transport::{ApiRequest, ApiResponse, StatusCode, Transport, TransportError};

use crate::config::SessionConfig;
use crate::refresh::RefreshCoordinator;
use crate::scheduler::ExpiryScheduler;
use crate::state::SessionState;

/// Fixed wall clock for tests, unix seconds.
pub(crate) const NOW: u64 = 1_700_000_000;

pub(crate) fn fixed_clock() -> u64 {
    NOW
}

/// Dot-separated token whose payload segment is `claims`.
pub(crate) fn token(claims: serde_json::Value) -> String {
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("eyJhbGciOiJub25lIn0.{payload}.sig")
}

pub(crate) fn expiring_token(exp: u64) -> String {
    token(serde_json::json!({ "sub": "user-1", "exp": exp }))
}

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        clock: fixed_clock,
        ..SessionConfig::default()
    }
}

struct FakeState {
    /// Credential the API currently accepts
    valid: Option<String>,
    /// Credentials handed out by renewal, in order
    issued: VecDeque<String>,
    reject_renewal: Option<StatusCode>,
    renewal_delay: Duration,
    /// Whether issued credentials become the accepted one
    honor_issued: bool,
    /// Renewal panics instead of answering
    panic_renewal: bool,
    issued_count: u64,
}

/// API double.
///
/// - the renewal path issues the next queued credential (or a generated one)
///   and starts accepting it, unless renewal is set to reject
/// - `/down` fails at the transport level
/// - `/forbidden` answers 403
/// - `/slow` answers like any other path, 200ms after arrival
/// - anything else answers 200 when the bearer matches the accepted
///   credential and 401 otherwise
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
    renewal_calls: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                valid: None,
                issued: VecDeque::new(),
                reject_renewal: None,
                renewal_delay: Duration::from_millis(50),
                honor_issued: true,
                panic_renewal: false,
                issued_count: 0,
            }),
            renewal_calls: AtomicUsize::new(0),
            requests: Mutex::new(vec![]),
        })
    }

    pub(crate) fn accept(&self, token: &str) {
        self.state.lock().unwrap().valid = Some(token.to_string());
    }

    pub(crate) fn issue_next(&self, token: &str) {
        self.state.lock().unwrap().issued.push_back(token.to_string());
    }

    pub(crate) fn reject_renewal(&self, status: StatusCode) {
        self.state.lock().unwrap().reject_renewal = Some(status);
    }

    pub(crate) fn allow_renewal(&self) {
        self.state.lock().unwrap().reject_renewal = None;
    }

    pub(crate) fn panic_on_renewal(&self) {
        self.state.lock().unwrap().panic_renewal = true;
    }

    pub(crate) fn stop_honoring_issued(&self) {
        self.state.lock().unwrap().honor_issued = false;
    }

    pub(crate) fn set_renewal_delay(&self, delay: Duration) {
        self.state.lock().unwrap().renewal_delay = delay;
    }

    pub(crate) fn renewal_calls(&self) -> usize {
        self.renewal_calls.load(Ordering::SeqCst)
    }

    /// Bearer tokens seen on non-renewal requests, in arrival order.
    pub(crate) fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.route() == path)
            .map(|r| r.bearer().map(str::to_string))
            .collect()
    }

    fn renewal_reply(&self) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.reject_renewal {
            return ApiResponse::new(status, "renewal refused");
        }
        state.issued_count += 1;
        let n = state.issued_count;
        let fresh = state.issued.pop_front().unwrap_or_else(|| {
            token(serde_json::json!({ "sub": "user-1", "exp": NOW + 3600, "n": n }))
        });
        if state.honor_issued {
            state.valid = Some(fresh.clone());
        }
        ApiResponse::new(
            StatusCode::OK,
            serde_json::json!({ "token": fresh }).to_string(),
        )
    }
}

impl Transport for FakeApi {
    fn id(&self) -> &str {
        "fake"
    }

    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            if request.route() == DEFAULT_RENEWAL_PATH {
                self.renewal_calls.fetch_add(1, Ordering::SeqCst);
                let (delay, explode) = {
                    let state = self.state.lock().unwrap();
                    (state.renewal_delay, state.panic_renewal)
                };
                tokio::time::sleep(delay).await;
                if explode {
                    panic!("renewal handler blew up");
                }
                return Ok(self.renewal_reply());
            }

            self.requests.lock().unwrap().push(request.clone());
            match request.route() {
                "/down" => Err(TransportError::Connect("connection refused".into())),
                "/forbidden" => Ok(ApiResponse::new(StatusCode::FORBIDDEN, "forbidden")),
                path => {
                    if path == "/slow" {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    let valid = self.state.lock().unwrap().valid.clone();
                    if valid.is_some() && request.bearer() == valid.as_deref() {
                        Ok(ApiResponse::new(StatusCode::OK, format!("ok:{path}")))
                    } else {
                        Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "expired"))
                    }
                }
            }
        })
    }
}

/// Components wired the way `SessionCoordinator` wires them.
pub(crate) struct Parts {
    pub store: Arc<TokenStore>,
    pub scheduler: Arc<ExpiryScheduler>,
    pub session: Arc<SessionState>,
    pub refresh: Arc<RefreshCoordinator>,
}

pub(crate) fn parts(api: Arc<FakeApi>, config: &SessionConfig) -> Parts {
    let store = Arc::new(TokenStore::in_memory());
    let scheduler = Arc::new(ExpiryScheduler::new(
        config.lead_time,
        config.min_delay,
        config.clock,
    ));
    let session = Arc::new(SessionState::new());
    let refresh = RefreshCoordinator::new(
        api,
        Arc::clone(&store),
        Arc::clone(&scheduler),
        Arc::clone(&session),
        config,
    );
    Parts {
        store,
        scheduler,
        session,
        refresh,
    }
}
