use crate::backup::{self, BackupOutcome};
use crate::error::{ErrorKind, Result};
use crate::host::{Host, ImportMode};
use crate::lock::{self, VersionLock};
use crate::result::{Fields, OperationResult};
use crate::sidecar::{self, MetadataOutcome, Producer};
use crate::{path, version};
use nox_config::FileManagerConfig;
use std::path::{Path, PathBuf};

/// Per-call overrides for [`FileManager::save`]. Unset flags fall back to
/// the manager's configuration.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub auto_version: Option<bool>,
    pub backup: Option<bool>,
    /// Written to the sidecar on top of the host's statistics.
    pub metadata: Fields,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub import_mode: ImportMode,
}

/// Orchestrates saves and loads for one host application.
///
/// A save validates the target against the project root, optionally picks
/// the next free version, archives whatever is about to be replaced, lets
/// the host write the content and finally writes the sidecar. Anything up to
/// and including the content write can fail the save; backup and sidecar
/// problems are logged and the save still succeeds.
pub struct FileManager<H: Host> {
    config: FileManagerConfig,
    host: H,
    last: Option<OperationResult>,
}
impl<H: Host> FileManager<H> {
    pub fn new(config: FileManagerConfig, host: H) -> Self {
        Self { config, host, last: None }
    }

    pub fn config(&self) -> &FileManagerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FileManagerConfig {
        &mut self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The result of the most recent save or load, successful or not.
    pub fn last_operation(&self) -> Option<&OperationResult> {
        self.last.as_ref()
    }

    pub fn producer(&self) -> Producer {
        Producer { software: self.host.tool_name().to_string(), version: self.host.tool_version() }
    }

    /// Save the host's current content to `path`.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&mut self, path: impl AsRef<Path>, options: SaveOptions) -> OperationResult {
        let path = path.as_ref();
        let result = match self.try_save(path, options) {
            Ok((target, fields)) => {
                tracing::info!(path = %target.display(), "Saved file");
                OperationResult::success(&target, format!("Saved to {}", target.display()), fields)
            },
            Err(err) => {
                tracing::error!(error = ?err, "Save failed");
                OperationResult::failure(err.failure(), format!("Save failed: {}", *err)).with_path(path)
            },
        };
        self.last = Some(result.clone());
        result
    }

    fn try_save(&mut self, path: &Path, options: SaveOptions) -> Result<(PathBuf, Fields)> {
        let mut target = path::resolve(path)?;
        path::validate_within_root(&target, &self.config.project_root)?;

        let _lock = if self.config.lock_versions {
            Some(VersionLock::acquire(&target, lock::DEFAULT_TIMEOUT)?)
        } else {
            None
        };

        if options.auto_version.unwrap_or(self.config.auto_version) {
            target = version::resolve_next_version(&target);
            tracing::debug!(path = %target.display(), "Auto-versioned");
        }

        if options.backup.unwrap_or(self.config.backup_enabled) {
            // Archive what the host has open; without one, whatever is about
            // to be overwritten.
            let source = self.host.current_open_path().filter(|p| p.is_file()).unwrap_or_else(|| target.clone());
            if let BackupOutcome::Failed(reason) = backup::backup(&source, self.config.backup_count) {
                tracing::warn!(source = %source.display(), %reason, "Continuing save without backup");
            }
        }

        let mut fields = self.host.write_content(&target).map_err(ErrorKind::Host)?;
        fields.extend(options.metadata);

        match sidecar::write(&self.config, &target, &self.producer(), &fields) {
            MetadataOutcome::Written(sidecar) => tracing::debug!(sidecar = %sidecar.display(), "Saved metadata"),
            MetadataOutcome::Failed(reason) => tracing::warn!(%reason, "Continuing save without metadata"),
            MetadataOutcome::Disabled => {},
        }
        Ok((target, fields))
    }

    /// Open `path` in the host.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(&mut self, path: impl AsRef<Path>, options: LoadOptions) -> OperationResult {
        let path = path.as_ref();
        let result = match self.try_load(path, options) {
            Ok((target, fields)) => {
                tracing::info!(path = %target.display(), "Loaded file");
                OperationResult::success(&target, format!("Loaded {}", target.display()), fields)
            },
            Err(err) => {
                tracing::error!(error = ?err, "Load failed");
                let message = match &*err {
                    ErrorKind::NotFound(missing) => format!("File not found: {}", missing.display()),
                    other => format!("Load failed: {other}"),
                };
                OperationResult::failure(err.failure(), message).with_path(path)
            },
        };
        self.last = Some(result.clone());
        result
    }

    fn try_load(&mut self, path: &Path, options: LoadOptions) -> Result<(PathBuf, Fields)> {
        let target = path::resolve(path)?;
        if !target.is_file() {
            exn::bail!(ErrorKind::NotFound(target));
        }

        // Surfaced for observability only; never changes how the file opens.
        let mut fields = Fields::new();
        if self.config.validate_on_load
            && let Some(document) = sidecar::read(&target)
        {
            tracing::info!(
                software = ?document.get("software"),
                saved_at = ?document.get("saved_at"),
                user = ?document.get("user"),
                "File metadata"
            );
            fields = document;
        }

        self.host.read_content(&target, options.import_mode).map_err(ErrorKind::Host)?;
        Ok((target, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BACKUP_DIR_NAME;
    use crate::result::Failure;
    use serde_json::json;
    use std::fs;

    /// Host that writes a counter into each saved file.
    #[derive(Default)]
    struct ScratchHost {
        open: Option<PathBuf>,
        saves: usize,
        loads: Vec<(PathBuf, ImportMode)>,
        fail_writes: bool,
    }
    impl Host for ScratchHost {
        fn write_content(&mut self, path: &Path) -> std::result::Result<Fields, String> {
            if self.fail_writes {
                return Err("scene is read-only".to_string());
            }
            self.saves += 1;
            fs::write(path, format!("save {}", self.saves)).map_err(|e| e.to_string())?;
            self.open = Some(path.to_path_buf());
            let mut stats = Fields::new();
            stats.insert("nodes".to_string(), json!(12));
            stats.insert("fps".to_string(), json!(24));
            Ok(stats)
        }

        fn read_content(&mut self, path: &Path, mode: ImportMode) -> std::result::Result<(), String> {
            self.loads.push((path.to_path_buf(), mode));
            self.open = Some(path.to_path_buf());
            Ok(())
        }

        fn current_open_path(&self) -> Option<PathBuf> {
            self.open.clone()
        }

        fn tool_name(&self) -> &str {
            "Scratch"
        }

        fn tool_version(&self) -> String {
            "2.0".to_string()
        }
    }

    fn manager(root: &Path) -> FileManager<ScratchHost> {
        FileManager::new(FileManagerConfig::with_root(root), ScratchHost::default())
    }

    fn work_dir(root: &Path) -> PathBuf {
        root.join("shots/SQ01/SH010/comp/work/scratch")
    }

    #[test]
    fn test_first_save_is_v001_with_sidecar() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        let result = manager.save(work_dir(root.path()).join("SH010_comp.nk"), SaveOptions::default());

        assert!(result.is_success(), "{}", result.message());
        let saved = result.path().unwrap();
        assert!(saved.ends_with("SH010_comp_v001.nk"));
        assert!(saved.is_file());
        assert!(sidecar::sidecar_path(saved).is_file());
        assert_eq!(result.metadata()["nodes"], json!(12));
        assert_eq!(manager.last_operation(), Some(&result));
    }

    #[test]
    fn test_caller_metadata_overrides_host_stats() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        let mut metadata = Fields::new();
        metadata.insert("fps".to_string(), json!(25));
        metadata.insert("artist_note".to_string(), json!("wip"));
        let options = SaveOptions { metadata, ..Default::default() };
        let result = manager.save(root.path().join("a.nk"), options);

        assert_eq!(result.metadata()["fps"], json!(25));
        let document = sidecar::read(result.path().unwrap()).unwrap();
        assert_eq!(document["fps"], json!(25));
        assert_eq!(document["artist_note"], json!("wip"));
        assert_eq!(document["nodes"], json!(12));
        assert_eq!(document["software"], json!("Scratch"));
    }

    #[test]
    fn test_outside_root_is_invalid_path() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("show");
        fs::create_dir(&root).unwrap();
        let mut manager = manager(&root);
        let result = manager.save(root.join("../escape.nk"), SaveOptions::default());

        assert!(!result.is_success());
        assert_eq!(result.failure_kind(), Some(Failure::InvalidPath));
        assert_eq!(manager.host().saves, 0);
        assert_eq!(manager.last_operation(), Some(&result));
    }

    #[test]
    fn test_host_failure_is_operation_failed() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        manager.host_mut().fail_writes = true;
        let result = manager.save(root.path().join("a.nk"), SaveOptions::default());

        assert_eq!(result.failure_kind(), Some(Failure::OperationFailed));
        assert!(result.message().contains("scene is read-only"));
        assert!(!sidecar::sidecar_path(root.path().join("a_v001.nk")).exists());
    }

    #[test]
    fn test_overwrite_saves_keep_retention() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        manager.config_mut().backup_count = 2;
        let target = root.path().join("shot.nk");
        let options = SaveOptions { auto_version: Some(false), ..Default::default() };

        for _ in 0..4 {
            assert!(manager.save(&target, options.clone()).is_success());
        }
        let mut backups: Vec<String> = fs::read_dir(root.path().join(BACKUP_DIR_NAME))
            .unwrap()
            .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
            .collect();
        backups.sort();
        // Saves 1-3 were archived before being overwritten; only the newest two survive.
        assert_eq!(backups, vec!["save 2".to_string(), "save 3".to_string()]);
    }

    #[test]
    fn test_backup_disabled_per_call() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        let target = root.path().join("shot.nk");
        let options = SaveOptions { auto_version: Some(false), backup: Some(false), ..Default::default() };
        manager.save(&target, options.clone());
        manager.save(&target, options);
        assert!(!root.path().join(BACKUP_DIR_NAME).exists());
    }

    #[test]
    fn test_metadata_disabled() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        manager.config_mut().metadata_enabled = false;
        let result = manager.save(root.path().join("a.nk"), SaveOptions::default());
        assert!(result.is_success());
        assert!(!sidecar::sidecar_path(result.path().unwrap()).exists());
    }

    #[test]
    fn test_version_lock_released_after_save() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        manager.config_mut().lock_versions = true;
        let target = root.path().join("a.nk");

        let result = manager.save(&target, SaveOptions::default());
        assert!(result.is_success(), "{}", result.message());
        assert!(!VersionLock::lock_path(&target).exists());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        let result = manager.load(root.path().join("nothing.nk"), LoadOptions::default());
        assert_eq!(result.failure_kind(), Some(Failure::NotFound));
        assert!(manager.host().loads.is_empty());
    }

    #[test]
    fn test_load_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut manager = manager(root.path());
        let saved = manager.save(root.path().join("a.nk"), SaveOptions::default());
        let path = saved.path().unwrap().to_path_buf();

        let first = manager.load(&path, LoadOptions { import_mode: ImportMode::Merge });
        let second = manager.load(&path, LoadOptions { import_mode: ImportMode::Merge });
        assert!(first.is_success() && second.is_success());
        assert_eq!(first.path(), second.path());
        assert_eq!(first.metadata()["software"], json!("Scratch"));
        assert_eq!(manager.host().loads.len(), 2);
        assert_eq!(manager.host().loads[0].1, ImportMode::Merge);
    }
}
