//! Connector error taxonomy.
//!
//! Every upstream failure is classified so the retry policy can decide
//! whether another attempt is worth it. None of these are fatal: they stop
//! at the policy boundary and surface only as `SourceResult` error strings.

use thiserror::Error;

/// Errors produced by a single connector call.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Timeout, connection refused, or a 5xx from the provider. Retryable.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The provider rejected the request (4xx, malformed query). Not retried.
    #[error("request rejected ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("payload parse error: {0}")]
    Parse(String),
}

impl ConnectorError {
    /// Only transient errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if (400..500).contains(&status) {
            ConnectorError::Permanent {
                status,
                message: message.into(),
            }
        } else {
            ConnectorError::Transient(format!("HTTP {}: {}", status, message.into()))
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return ConnectorError::from_status(status.as_u16(), e.to_string());
        }
        if e.is_decode() {
            return ConnectorError::Parse(e.to_string());
        }
        // Timeouts, connect failures, and anything else transport-level.
        ConnectorError::Transient(e.to_string())
    }
}
