//! Uniform outcome of a save, load or publish.

use derive_more::Display;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Free-form key/value payload: host scene statistics, caller overrides,
/// tracking identifiers.
pub type Fields = Map<String, Value>;

/// Why an operation failed, as reported to the host application.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize)]
pub enum Failure {
    /// Outside the project root, or the directory could not be created.
    InvalidPath,
    /// The file to load does not exist.
    NotFound,
    /// A tracking operation ran without an entity/task context.
    ContextRequired,
    /// No path could be resolved for a publish.
    NothingToPublish,
    /// The tracking service failed or timed out.
    TrackingUnavailable,
    /// Anything else, most commonly the host failing to write or read.
    OperationFailed,
}

/// The outcome of one operation. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationResult {
    success: bool,
    failure: Option<Failure>,
    path: Option<PathBuf>,
    message: String,
    metadata: Fields,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}
impl OperationResult {
    pub fn success(path: impl Into<PathBuf>, message: impl Into<String>, metadata: Fields) -> Self {
        Self {
            success: true,
            failure: None,
            path: Some(path.into()),
            message: message.into(),
            metadata,
            timestamp: crate::now(),
        }
    }

    pub fn failure(failure: Failure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            path: None,
            message: message.into(),
            metadata: Fields::new(),
            timestamp: crate::now(),
        }
    }

    /// Attach the path the failed operation was acting on.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add one metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Append a follow-up sentence to the message, for secondary steps that
    /// failed without failing the operation.
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        self.message = format!("{}; {}", self.message, note.as_ref());
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Set when [`is_success`](Self::is_success) is `false`.
    pub fn failure_kind(&self) -> Option<Failure> {
        self.failure
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &Fields {
        &self.metadata
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success() {
        let mut fields = Fields::new();
        fields.insert("fps".to_string(), json!(24));
        let result = OperationResult::success("/show/a_v001.nk", "saved", fields);
        assert!(result.is_success());
        assert_eq!(result.failure_kind(), None);
        assert_eq!(result.path(), Some(Path::new("/show/a_v001.nk")));
        assert_eq!(result.metadata()["fps"], json!(24));
    }

    #[test]
    fn test_failure() {
        let result = OperationResult::failure(Failure::NotFound, "missing").with_path("/show/gone.nk");
        assert!(!result.is_success());
        assert_eq!(result.failure_kind(), Some(Failure::NotFound));
        assert_eq!(result.message(), "missing");
        assert_eq!(result.path(), Some(Path::new("/show/gone.nk")));
        assert!(result.metadata().is_empty());
    }

    #[test]
    fn test_amended_success() {
        let result = OperationResult::success("/show/a_v001.nk", "Saved", Fields::new())
            .with_metadata("tracking_error", "service unavailable")
            .with_note("tracking registration failed");
        assert!(result.is_success());
        assert_eq!(result.message(), "Saved; tracking registration failed");
        assert_eq!(result.metadata()["tracking_error"], json!("service unavailable"));
    }

    #[test]
    fn test_serializes_for_host_bridges() {
        let result = OperationResult::failure(Failure::ContextRequired, "no context");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["failure"], json!("ContextRequired"));
        assert!(value["timestamp"].is_string());
    }
}
