//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use nox_files::Failure;
use nox_tracking::EntityRef;
use std::path::PathBuf;

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Set a tracking context (or save inside the project layout) first
    #[display("no tracking context: {_0}")]
    ContextRequired(#[error(not(source))] &'static str),
    /// No path given and the host has nothing open
    #[display("no file open to publish")]
    NothingToPublish,
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Publish location is outside the project root, or would overwrite its source
    #[display("invalid publish location: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The tracking service failed or refused the call
    #[display("tracking service call failed")]
    Tracking,
    /// A record the context points at is missing from the tracking service
    #[display("{} {} not found in tracking service", _0.entity_type, _0.id)]
    MissingRecord(#[error(not(source))] EntityRef),
    /// Local file operation failed
    #[display("file operation failed: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Tracking)
    }

    /// Which failure a caller sees when this error ends an operation.
    pub fn failure(&self) -> Failure {
        match self {
            // The context names a record that is gone; it has to be set again.
            Self::ContextRequired(_) | Self::MissingRecord(_) => Failure::ContextRequired,
            Self::NothingToPublish => Failure::NothingToPublish,
            Self::NotFound(_) => Failure::NotFound,
            Self::InvalidPath(_) => Failure::InvalidPath,
            Self::Tracking => Failure::TrackingUnavailable,
            Self::Io(_) => Failure::OperationFailed,
        }
    }
}
