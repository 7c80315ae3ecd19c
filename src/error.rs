//! Error taxonomy shared by the upstream adapters and the routes.
//!
//! The `Display` string of each variant is the message shown to users, so
//! routes can forward `err.to_string()` as the `{error}` body unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error or API unavailable. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A provider API key is missing. Never retried.
    #[error("API configuration error. Please contact support.")]
    Configuration { key: &'static str },

    /// Non-2xx from the provider; `message` is the provider's own when it sent one.
    #[error("{message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("{0}")]
    Timeout(String),

    /// The provider answered but nothing survived filtering.
    #[error("{0}")]
    EmptyResult(String),

    /// Transport or decode failure; the detail is only logged.
    #[error("Network error or API unavailable. Please try again later.")]
    Network(String),
}

impl Error {
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout("Upstream request timed out. Please try again later.".to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Wire form of any failure: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        ErrorBody::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message() {
        let err = Error::Configuration { key: "NEWSAPI_KEY" };
        assert_eq!(
            err.to_string(),
            "API configuration error. Please contact support."
        );
    }

    #[test]
    fn test_upstream_message_passes_through() {
        let err = Error::UpstreamHttp {
            status: 401,
            message: "Your API key is invalid.".to_string(),
        };
        assert_eq!(ErrorBody::from(&err).error, "Your API key is invalid.");
    }

    #[test]
    fn test_network_detail_is_hidden() {
        let err = Error::Network("connection refused".to_string());
        assert_eq!(err.to_string(), NETWORK_ERROR_MESSAGE);
    }

    #[test]
    fn test_error_body_serializes_as_envelope() {
        let body = ErrorBody::new("Article not found");
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"error": "Article not found"})
        );
    }
}
