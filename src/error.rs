//! Error handling for the attendance client

use std::fmt;
use thiserror::Error;

use wifi_attendance_auth::AuthError;
use wifi_attendance_postgrest::PostgrestError;

/// Unified error type for the attendance client
///
/// Eligibility rejections are not errors; see [`crate::ledger::Outcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// Identity service failures, including rejected credentials
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Document store failures (connectivity, permissions, bad responses)
    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A document the operation depends on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The signed-in account has no usable directory entry
    #[error("Account setup incomplete: {0}")]
    AccountSetup(String),

    /// In-process store failures
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new account setup error
    pub fn account_setup<T: fmt::Display>(msg: T) -> Self {
        Error::AccountSetup(msg.to_string())
    }

    /// Create a new store error
    pub fn store<T: fmt::Display>(msg: T) -> Self {
        Error::Store(msg.to_string())
    }

    /// Text shown to the user when the action fails
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_setup_message() {
        let err = Error::account_setup("No role assigned");
        assert_eq!(err.to_string(), "Account setup incomplete: No role assigned");
        assert_eq!(err.user_message(), err.to_string());
    }

    #[test]
    fn auth_errors_use_friendly_message() {
        let err: Error = AuthError::MissingSession.into();
        assert_eq!(err.user_message(), "Missing session");
    }
}
