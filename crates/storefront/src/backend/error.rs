//! Errors returned by the backend boundary.

use thiserror::Error;

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The auth service rejected the email/password pair.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// The operation needs a signed-in user.
    #[error("no authenticated session")]
    NotAuthenticated,

    /// A single-row query matched nothing.
    #[error("no rows returned")]
    NotFound,

    /// A single-row query matched more than one row.
    #[error("expected a single row, got {0}")]
    MultipleRows(usize),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decoding failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The realtime socket failed or was closed.
    #[error("realtime error: {0}")]
    Realtime(String),
}

impl BackendError {
    /// Build an [`BackendError::Api`] from a status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// True for failures worth retrying (network trouble, 5xx, rate limits).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Realtime(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::api(503, "unavailable").is_transient());
        assert!(BackendError::api(429, "slow down").is_transient());
        assert!(!BackendError::api(403, "permission denied").is_transient());
        assert!(!BackendError::InvalidCredentials.is_transient());
        assert!(!BackendError::MultipleRows(2).is_transient());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BackendError::api(400, "bad filter").to_string(),
            "backend returned 400: bad filter"
        );
        assert_eq!(
            BackendError::MultipleRows(3).to_string(),
            "expected a single row, got 3"
        );
    }
}
