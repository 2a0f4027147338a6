//! Configuration errors shared by the workspace binaries

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading configuration failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a validation failure on a named field.
    pub fn invalid(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Config(format!("{field} {reason}"))
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_names_the_field() {
        let err = Error::invalid("api.timeout_secs", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid configuration: api.timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(
            err.to_string().starts_with("reading configuration failed:"),
            "got: {err}"
        );
        assert!(format!("{err:?}").contains("Io"));
    }
}
