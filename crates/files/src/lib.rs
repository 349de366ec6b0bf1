pub mod backup;
pub mod error;
mod host;
pub mod lock;
mod manager;
pub mod path;
mod result;
pub mod sidecar;
pub mod version;

pub use crate::backup::{BackupOutcome, copy_with_mtime};
pub use crate::host::{Host, ImportMode};
pub use crate::manager::{FileManager, LoadOptions, SaveOptions};
pub use crate::path::validate_within_root;
pub use crate::result::{Failure, Fields, OperationResult};
pub use crate::sidecar::{MetadataOutcome, Producer};
pub use crate::version::{VersionedFile, resolve_next_version};
pub use nox_config::FileManagerConfig;
use time::OffsetDateTime;

/// Current local time, or UTC where the local offset can't be determined.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
