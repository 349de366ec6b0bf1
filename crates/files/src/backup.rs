//! Backup retention.
//!
//! Before a file is overwritten its current bytes are archived into a
//! `.backups` directory next to it:
//!
//! ```text
//! shots/SQ01/SH010/comp/work/nuke/
//! ├── SH010_comp_v003.nk
//! └── .backups/
//!     ├── SH010_comp_v003_20261019_143000.nk
//!     └── SH010_comp_v003_20261019_143512.nk
//! ```
//!
//! Archive copies keep the modification time of the file they came from.
//! After each new archive, older copies for the same stem are pruned down to
//! the configured retention count, newest first by modification time.

use crate::error::{ErrorKind, Result};
use nox_config::FileManagerConfig;
use std::cmp::Reverse;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Name of the archive directory created beside backed-up files.
pub const BACKUP_DIR_NAME: &str = ".backups";

const STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// What happened to the backup step of a save. Never fails the save itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Backups are disabled, or there was nothing on disk to archive.
    Skipped,
    Created(PathBuf),
    Failed(String),
}
impl BackupOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Created(path) => Some(path),
            _ => None,
        }
    }
}

/// Result of a retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Archives still present, newest first.
    pub retained: Vec<PathBuf>,
    /// Archives deleted by this pass.
    pub removed: Vec<PathBuf>,
}

/// The archive directory for `path`.
pub fn backup_dir(path: &Path) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("")).join(BACKUP_DIR_NAME)
}

/// Archive `path` if backups are enabled and it exists, then prune.
pub fn backup_if_needed(config: &FileManagerConfig, path: &Path) -> BackupOutcome {
    if !config.backup_enabled {
        return BackupOutcome::Skipped;
    }
    backup(path, config.backup_count)
}

/// Archive `path` if it exists, then prune its archives to `retention`.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn backup(path: &Path, retention: usize) -> BackupOutcome {
    if !path.is_file() {
        return BackupOutcome::Skipped;
    }
    let archive = match create_backup(path) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::warn!(error = ?err, "Backup failed");
            return BackupOutcome::Failed((*err).to_string());
        },
    };
    tracing::info!(backup = %archive.display(), "Created backup");

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    if let Some(directory) = archive.parent() {
        prune(&stem, directory, retention);
    }
    BackupOutcome::Created(archive)
}

/// Copy `path` into its archive directory under a timestamped name.
fn create_backup(path: &Path) -> Result<PathBuf> {
    let directory = backup_dir(path);
    fs::create_dir_all(&directory).map_err(|e| ErrorKind::io(e, &directory))?;

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let stamp = crate::now().format(STAMP_FORMAT).map_err(|e| ErrorKind::Io(std::io::Error::other(e)))?;

    let mut archive = directory.join(format!("{stem}_{stamp}{extension}"));
    let mut counter = 1;
    while archive.exists() {
        archive = directory.join(format!("{stem}_{stamp}_{counter}{extension}"));
        counter += 1;
    }

    copy_with_mtime(path, &archive)?;
    Ok(archive)
}

/// Copy `from` to `to`, carrying over the modification time.
///
/// Returns the number of bytes copied.
pub fn copy_with_mtime(from: &Path, to: &Path) -> Result<u64> {
    let modified = fs::metadata(from).and_then(|m| m.modified()).map_err(|e| ErrorKind::io(e, from))?;
    let bytes = fs::copy(from, to).map_err(|e| ErrorKind::io(e, from))?;
    File::options()
        .write(true)
        .open(to)
        .and_then(|file| file.set_modified(modified))
        .map_err(|e| ErrorKind::io(e, to))?;
    Ok(bytes)
}

/// Keep the `retention` newest archives for `base_name` in `backup_dir` and
/// delete the rest.
///
/// Archives belong to `base_name` when their file name starts with
/// `{base_name}_`. Equal modification times fall back to the file name,
/// descending, with digit runs compared as numbers so that a `_10`
/// collision counter sorts after `_9`. Deletion failures are logged and the archive is counted as
/// retained.
pub fn prune(base_name: &str, backup_dir: &Path, retention: usize) -> PruneReport {
    let prefix = format!("{base_name}_");
    let entries = match fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(directory = %backup_dir.display(), error = %err, "Nothing to prune");
            return PruneReport::default();
        },
    };
    let mut archives: Vec<(SystemTime, Vec<NamePart>, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(&prefix) {
                return None;
            }
            let metadata = entry.metadata().ok().filter(|m| m.is_file())?;
            Some((metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH), natural_key(&name), entry.path()))
        })
        .collect();
    archives.sort_by(|a, b| (Reverse(&a.0), Reverse(&a.1)).cmp(&(Reverse(&b.0), Reverse(&b.1))));

    let mut report = PruneReport::default();
    for (index, (_, _, path)) in archives.into_iter().enumerate() {
        if index < retention {
            report.retained.push(path);
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed old backup");
                report.removed.push(path);
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to remove old backup");
                report.retained.push(path);
            },
        }
    }
    report
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NamePart {
    Number(u64),
    Text(String),
}

/// Split `name` into text and numeric runs for natural ordering.
fn natural_key(name: &str) -> Vec<NamePart> {
    let mut parts = Vec::new();
    let mut rest = name;
    while let Some(first) = rest.chars().next() {
        let digits = first.is_ascii_digit();
        let end = rest.find(|c: char| c.is_ascii_digit() != digits).unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        parts.push(match run.parse::<u64>() {
            Ok(number) if digits => NamePart::Number(number),
            _ => NamePart::Text(run.to_string()),
        });
        rest = tail;
    }
    parts
}
