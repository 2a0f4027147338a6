//! Credential renewal endpoint
//!
//! One POST to the renewal path with no body. The server identifies the
//! session from ambient state (cookies held by the transport's client, plus
//! the current bearer when there is one) and answers with a fresh credential
//! string. Renewal never retries: the caller decides what a failure means.

use serde::Deserialize;
use transport::{ApiRequest, Transport};

use crate::credential::Credential;
use crate::error::{Error, Result};

/// Body returned by the renewal endpoint.
#[derive(Debug, Deserialize)]
pub struct RenewalResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    pub token: String,
}

/// Build the renewal request, carrying the current credential if any.
pub fn renewal_request(path: &str, current: Option<&Credential>) -> Result<ApiRequest> {
    ApiRequest::post(path)
        .authorized(current.map(Credential::raw))
        .ok_or_else(|| Error::InvalidResponse("held credential is not a valid header value".into()))
}

/// Call the renewal endpoint once.
///
/// Any non-2xx status, 401 included, is a rejection. The renewal call
/// goes straight to the transport and never through the request gate, so a
/// rejected renewal cannot itself trigger another renewal.
pub async fn renew(
    transport: &dyn Transport,
    path: &str,
    current: Option<&Credential>,
) -> Result<Credential> {
    let request = renewal_request(path, current)?;
    let response = transport.send(&request).await?;

    if !response.status.is_success() {
        return Err(Error::Rejected {
            status: response.status.as_u16(),
            body: response.text(),
        });
    }

    let body: RenewalResponse = serde_json::from_slice(&response.body)
        .map_err(|e| Error::InvalidResponse(format!("decoding renewal body: {e}")))?;
    let token = body.token.trim();
    if token.is_empty() {
        return Err(Error::InvalidResponse("renewal returned an empty token".into()));
    }
    Ok(Credential::parse(token))
}
