//! Bearer credential and its claims
//!
//! Credentials are opaque server-issued strings. When one happens to be a
//! dot-separated token whose second segment is base64url JSON, the `exp` and
//! `sub` claims are read from it. Nothing here verifies a signature, and a
//! credential without readable claims is still a usable credential: it just
//! has no expiry to schedule against.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use serde::Deserialize;

/// An issued bearer credential. Replaced on renewal, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    raw: Secret<String>,
    subject: Option<String>,
    /// Expiry as unix seconds, when the claim is present and numeric
    expires_at: Option<u64>,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<serde_json::Value>,
    #[serde(default)]
    sub: Option<serde_json::Value>,
}

impl Credential {
    /// Wrap a raw credential, reading whatever claims it exposes.
    ///
    /// Never fails: unreadable claims leave `subject` and `expires_at` empty.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let claims = read_claims(&raw);
        let (subject, expires_at) = match claims {
            Some(c) => (
                c.sub.and_then(|sub| match sub {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                }),
                c.exp.as_ref().and_then(numeric_claim),
            ),
            None => (None, None),
        };
        Self {
            raw: Secret::new(raw),
            subject,
            expires_at,
        }
    }

    /// The raw value, for attaching to requests and persisting.
    pub fn raw(&self) -> &str {
        self.raw.expose()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Whether the expiry claim is at or before `now`. Unknown expiry is
    /// never considered expired.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

fn read_claims(raw: &str) -> Option<Claims> {
    let mut segments = raw.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Accepts integer or fractional seconds; rejects negatives and strings.
fn numeric_claim(value: &serde_json::Value) -> Option<u64> {
    if let Some(secs) = value.as_u64() {
        return Some(secs);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.floor() as u64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned token carrying the given claims JSON.
    pub(crate) fn token_with_claims(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn reads_exp_and_sub() {
        let raw = token_with_claims(serde_json::json!({"sub": "user-42", "exp": 1_900_000_000u64}));
        let cred = Credential::parse(raw.clone());
        assert_eq!(cred.raw(), raw);
        assert_eq!(cred.subject(), Some("user-42"));
        assert_eq!(cred.expires_at(), Some(1_900_000_000));
    }

    #[test]
    fn fractional_exp_is_floored() {
        let cred = Credential::parse(token_with_claims(serde_json::json!({"exp": 1700.9})));
        assert_eq!(cred.expires_at(), Some(1700));
    }

    #[test]
    fn padded_payload_still_parses() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":50}"#);
        assert!(payload.ends_with('='));
        let cred = Credential::parse(format!("{header}.{payload}.x"));
        assert_eq!(cred.expires_at(), Some(50));
    }

    #[test]
    fn opaque_string_has_no_claims() {
        let cred = Credential::parse("not-a-structured-token");
        assert_eq!(cred.raw(), "not-a-structured-token");
        assert!(cred.expires_at().is_none());
        assert!(cred.subject().is_none());
    }

    #[test]
    fn garbage_payload_has_no_claims() {
        let cred = Credential::parse("aaa.!!!notbase64!!!.ccc");
        assert!(cred.expires_at().is_none());

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        let cred = Credential::parse(format!("aaa.{not_json}.ccc"));
        assert!(cred.expires_at().is_none());
    }

    #[test]
    fn non_numeric_exp_is_ignored() {
        let cred = Credential::parse(token_with_claims(
            serde_json::json!({"sub": "u", "exp": "tomorrow"}),
        ));
        assert!(cred.expires_at().is_none());
        assert_eq!(cred.subject(), Some("u"));

        let negative = Credential::parse(token_with_claims(serde_json::json!({"exp": -10})));
        assert!(negative.expires_at().is_none());
    }

    #[test]
    fn non_string_sub_keeps_expiry() {
        let cred = Credential::parse(token_with_claims(serde_json::json!({"sub": 42, "exp": 900})));
        assert!(cred.subject().is_none());
        assert_eq!(cred.expires_at(), Some(900));
    }

    #[test]
    fn expiry_check() {
        let cred = Credential::parse(token_with_claims(serde_json::json!({"exp": 100})));
        assert!(cred.is_expired_at(100));
        assert!(!cred.is_expired_at(99));
        assert!(!Credential::parse("opaque").is_expired_at(u64::MAX));
    }

    #[test]
    fn debug_redacts_raw_value() {
        let cred = Credential::parse("super-secret-token");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("super-secret-token"), "leaked: {debug}");
    }
}
