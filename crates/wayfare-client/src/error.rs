//! Error types for the Wayfare client
//!
//! Defines the error handling system for the client, using thiserror for
//! ergonomic error definitions and anyhow for flexible error sources.
//! Transport failures carry a classification that drives the retry policy.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (bad base URL, zero timeout, ...)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Request construction errors (URL join failure, invalid header, ...)
    #[error("Request error: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Network-level failures: the request never produced an HTTP response
    #[error("Transport error ({classification:?}): {message}")]
    Transport {
        message: String,
        classification: ErrorClassification,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Application-level error response (4xx/5xx), surfaced verbatim
    #[error("Request failed with status {status}")]
    Status {
        status: StatusCode,
        body: Option<Value>,
    },

    /// Response body could not be parsed as JSON
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The session refresh call itself failed; the original request was not
    /// replayed. `status` is the refresh endpoint's status when it answered,
    /// `None` when the refresh call failed at the transport level.
    #[error("Session refresh failed: {message}")]
    RefreshFailed {
        status: Option<u16>,
        message: String,
    },

    /// Internal failure (a parked request was dropped without an outcome)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of transport failures for retry logic.
///
/// Serializable so callers can record it in structured failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// The attempt exceeded its timeout - transient, retryable
    Timeout,
    /// The connection could not be established - transient, retryable
    Connect,
    /// Anything else (TLS failure, protocol error, ...) - not retried
    Other,
}

impl ErrorClassification {
    /// Check if this failure type is eligible for automatic retry
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClassification::Timeout | ErrorClassification::Connect)
    }
}

impl Error {
    /// Create from a reqwest transport error, classifying it for retry
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() {
            ErrorClassification::Timeout
        } else if error.is_connect() {
            ErrorClassification::Connect
        } else {
            ErrorClassification::Other
        };

        Error::Transport {
            message: error.to_string(),
            classification,
            source: Some(anyhow::Error::new(error)),
        }
    }

    /// Check if this error is a transient transport failure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport { classification, .. } if classification.is_transient()
        )
    }

    /// The HTTP status carried by this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::RefreshFailed { status, .. } => {
                status.and_then(|s| StatusCode::from_u16(s).ok())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_transience() {
        assert!(ErrorClassification::Timeout.is_transient());
        assert!(ErrorClassification::Connect.is_transient());
        assert!(!ErrorClassification::Other.is_transient());
    }

    #[test]
    fn test_status_error_is_not_transient() {
        let err = Error::Status { status: StatusCode::INTERNAL_SERVER_ERROR, body: None };
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_transport_error_transience() {
        let err = Error::Transport {
            message: "connection refused".to_string(),
            classification: ErrorClassification::Connect,
            source: None,
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_classification_serialization_round_trip() {
        let json = serde_json::to_string(&ErrorClassification::Timeout).unwrap();
        assert_eq!(json, "\"Timeout\"");

        let back: ErrorClassification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorClassification::Timeout);
    }

    #[test]
    fn test_refresh_failed_status() {
        let err = Error::RefreshFailed { status: Some(401), message: "unauthorized".to_string() };
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

        let err = Error::RefreshFailed { status: None, message: "connect error".to_string() };
        assert_eq!(err.status(), None);
    }
}
