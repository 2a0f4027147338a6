//! Error types for credential storage and renewal

use transport::TransportError;

/// Errors from the token store and the renewal endpoint.
///
/// `Clone` because one renewal failure is delivered to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("renewal request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("renewal rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid renewal response: {0}")]
    InvalidResponse(String),

    #[error("credential slot I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
