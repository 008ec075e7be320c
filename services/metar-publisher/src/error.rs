//! Error taxonomy for the publisher service.
//!
//! Per-airport errors (`FetchError`, `PublishError`) are recorded at airport
//! scope and never abort a cycle. `ConfigError` and `StartupError` are fatal
//! and stop the process before the cycle loop starts.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single upstream weather request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Upstream server error: HTTP {0}")]
    Server(u16),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Request rejected: HTTP {0}")]
    Client(u16),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    /// Network errors, timeouts, 5xx and 429 are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Server(_) | Self::RateLimited
        )
    }

    pub fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status.is_server_error() {
            Self::Server(status.as_u16())
        } else {
            Self::Client(status.as_u16())
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status)
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failure to publish one entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Credentials were refused; never retried.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Transient publish failure: {0}")]
    Transient(String),

    #[error("Entity rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Auth(format!("HTTP {}", status.as_u16()))
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                Self::Transient(format!("HTTP {}: {}", status.as_u16(), message))
            }
            s if s.is_server_error() => Self::Transient(format!("HTTP {}: {}", s.as_u16(), message)),
            s => Self::Rejected {
                status: s.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status, err.to_string()),
            None => Self::Transient(err.to_string()),
        }
    }
}

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Environment variable {0} not set")]
    MissingVariable(String),

    #[error("Missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal errors that prevent the service from entering the cycle loop.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Entity platform rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Entity platform unreachable: {0}")]
    PlatformUnreachable(String),
}
