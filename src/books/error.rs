//! Error types for the search pipeline.

use thiserror::Error;

/// An argument that could not be turned into an upstream query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid argument '{field}': {reason}")]
pub struct ValidationError {
    /// Argument name as supplied by the client.
    pub field: String,
    /// Description of what's wrong.
    pub reason: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures talking to the upstream catalogue.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-2xx status. The body is not read.
    #[error("Upstream request failed: {status_code} {status_text}")]
    Status {
        /// HTTP status code.
        status_code: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
    },

    /// The body was not valid JSON.
    #[error("Upstream returned an unparsable body: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// The continuation URL or base endpoint could not be parsed.
    #[error("Invalid upstream URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },

    /// Connection, TLS or protocol failure before a status was received.
    #[error("Upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The owning session closed while the request was in flight.
    #[error("Upstream request cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Creates a status error from an HTTP status code.
    #[must_use]
    pub fn status(status: reqwest::StatusCode) -> Self {
        Self::Status {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// Returns the HTTP status code if upstream answered with one.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::new("sort", "must be one of: popular, ascending, descending");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'sort': must be one of: popular, ascending, descending"
        );
    }

    #[test]
    fn status_error_from_code() {
        let err = UpstreamError::status(reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(
            err.to_string(),
            "Upstream request failed: 503 Service Unavailable"
        );
    }

    #[test]
    fn cancelled_has_no_status() {
        assert_eq!(UpstreamError::Cancelled.status_code(), None);
    }
}
