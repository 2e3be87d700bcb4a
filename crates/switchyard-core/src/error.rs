//! Error types for the Switchyard gateway

use std::time::Duration;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the gateway
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error from hyper
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Invalid HTTP request
    #[error("Invalid HTTP request: {0}")]
    InvalidRequest(String),

    /// No configured route matches the request path
    #[error("No route matches path '{0}'")]
    RouteNotFound(String),

    /// Client exceeded its request quota for the current window
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the client's window resets
        retry_after: Duration,
    },

    /// Backend could not be reached or the transport failed
    #[error("Backend '{target}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend base URL
        target: String,
        /// Transport failure detail
        reason: String,
    },

    /// Backend did not answer within the forwarding timeout
    #[error("Backend '{target}' did not respond within {timeout:?}")]
    BackendTimeout {
        /// Backend base URL
        target: String,
        /// Configured forwarding timeout
        timeout: Duration,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP message construction error
    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    /// Unexpected fault inside the gateway
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Error::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Time the caller should wait before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Create a backend-unavailable error
    pub fn unavailable(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::BackendUnavailable {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Whole seconds for a `Retry-After` header, rounded up
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
