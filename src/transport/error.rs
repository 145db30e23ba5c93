//! Transport error types

use thiserror::Error;

/// Errors that can occur when talking to the engine
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint could not be reached or the request failed in flight
    #[error("Connection failed: {0}")]
    Connection(#[source] reqwest::Error),

    /// The request did not finish before its deadline
    #[error("Request timeout")]
    Timeout,

    /// Login exchange failed while constructing the transport
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Non-success HTTP status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The engine reported a logical failure (`status != "succ"`)
    #[error("Engine error {code}: {desc}")]
    Engine { code: i64, desc: String },

    /// The response body is not a valid engine response
    #[error("Cannot decode engine response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid endpoint or credentials configuration
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Connection(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_is_verbatim() {
        let err = TransportError::Engine {
            code: 534,
            desc: "Syntax error in SQL".to_string(),
        };
        assert_eq!(err.to_string(), "Engine error 534: Syntax error in SQL");
    }

    #[test]
    fn test_decode_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: TransportError = json_err.into();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
