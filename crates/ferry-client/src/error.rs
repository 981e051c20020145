//! Client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from reading an environment or building a client for it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The environment returned a non-success status code.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The environment returned 429 Too Many Requests.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Failed to parse a response body.
    #[error("parse error: {0}")]
    Parse(String),

    /// No secret is configured for the environment.
    #[error("no credentials configured for environment {environment_id}")]
    MissingCredentials { environment_id: String },

    /// No client can be built for the environment.
    #[error("environment {environment_id} is unavailable: {reason}")]
    Unavailable {
        environment_id: String,
        reason: String,
    },
}

/// Outcome of a failed destination write, classified for the loader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// Worth retrying in-process: timeouts, connection failures, 5xx, 429.
    #[error("{message}")]
    Transient {
        message: String,
        /// Server-requested delay before the next try.
        retry_after: Option<Duration>,
    },

    /// Retrying will not help: validation rejection or another 4xx.
    #[error("{message}")]
    Permanent { message: String },
}

impl WriteError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
