//! Tracking Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A tracking service error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for tracking operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Request failed in flight; the service may or may not have applied it
    #[display("tracking service unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// Service was unreachable or turned the request away unprocessed
    #[display("tracking service refused the request: {_0}")]
    Refused(#[error(not(source))] String),
    /// Credentials were refused
    #[display("tracking service rejected credentials")]
    Auth,
    /// The request was understood and refused (bad filter, unknown field...)
    #[display("tracking service rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        #[error(not(source))]
        message: String,
    },
    /// The response could not be decoded
    #[display("invalid response from tracking service")]
    InvalidResponse,
    /// No service URL or credentials are configured
    #[display("tracking service is not configured")]
    NotConfigured,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Refused(_))
    }

    /// Returns `true` if the request is known not to have been applied, so
    /// repeating a write cannot duplicate it.
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, Self::Refused(_))
    }

    /// Classify an HTTP status code returned by the service.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 | 503 => Self::Refused(format!("HTTP {status}")),
            408 | 500..=599 => Self::Unavailable(format!("HTTP {status}")),
            _ => Self::Rejected { status, message: message.into() },
        }
    }
}
