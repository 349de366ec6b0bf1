//! File Lifecycle Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::result::Failure;
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A file lifecycle error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for file lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Path escapes the project root, or its directory cannot be created
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Another writer holds the version family lock
    #[display("version family is locked: {}", _0.display())]
    Locked(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Sidecar metadata could not be encoded or decoded
    #[display("invalid sidecar metadata")]
    Metadata,
    /// The host application failed to write or read content
    #[display("host operation failed: {_0}")]
    Host(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Map an I/O error onto the path it happened to.
    pub fn io(err: IoError, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Locked(_))
    }

    /// Which failure a caller sees when this error ends an operation.
    pub fn failure(&self) -> Failure {
        match self {
            Self::NotFound(_) => Failure::NotFound,
            Self::InvalidPath(_) => Failure::InvalidPath,
            _ => Failure::OperationFailed,
        }
    }
}
