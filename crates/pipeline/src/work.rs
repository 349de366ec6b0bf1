//! Work files: where they go, saving them, registering them.

use crate::Synchronizer;
use crate::convention::Location;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use nox_files::version::{next_version_in, version_from_path};
use nox_files::{Fields, Host, OperationResult, SaveOptions};
use nox_tracking::{EntityType, Filter};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Published file type under which work files are registered.
pub const WORK_FILE_TYPE: &str = "Work File";
/// Status of registered work files: not submitted for review.
const WORK_FILE_STATUS: &str = "na";

const DEFAULT_SEQUENCE: &str = "SEQ";
const DEFAULT_ASSET_TYPE: &str = "prop";

impl<H: Host> Synchronizer<H> {
    /// Path for the next work file of the current context.
    ///
    /// The file lands in the context's work directory for the host
    /// application and is named `{name}_v###{ext}`, where `name` defaults to
    /// `{entity code}_{step}`. Without an explicit `version`, the directory is
    /// scanned and the number after the highest existing one is used. The
    /// directory is created if needed.
    ///
    /// # Errors
    /// [`ContextRequired`](ErrorKind::ContextRequired) without an entity and
    /// task, [`MissingRecord`](ErrorKind::MissingRecord) when either no
    /// longer exists remotely.
    #[tracing::instrument(skip_all)]
    pub fn work_file_path(&self, name: Option<&str>, version: Option<u64>) -> Result<PathBuf> {
        let (context, task) = self.task_context("work file path")?;

        let group_field = match context.entity.entity_type {
            EntityType::Asset => "sg_asset_type",
            _ => "sg_sequence.Sequence.code",
        };
        let entity = self
            .tracking
            .find_one(context.entity.entity_type, &[Filter::is("id", context.entity.id)], &["code", group_field], &[])
            .or_raise(|| ErrorKind::Tracking)?
            .ok_or_raise(|| ErrorKind::MissingRecord(context.entity))?;
        let task_record = self
            .tracking
            .find_one(EntityType::Task, &[Filter::is("id", task.id)], &["step.Step.short_name"], &[])
            .or_raise(|| ErrorKind::Tracking)?
            .ok_or_raise(|| ErrorKind::MissingRecord(task))?;

        let default_group = match context.entity.entity_type {
            EntityType::Asset => DEFAULT_ASSET_TYPE,
            _ => DEFAULT_SEQUENCE,
        };
        let location = Location {
            entity_type: context.entity.entity_type,
            group: entity.str(group_field).unwrap_or(default_group).to_string(),
            code: entity.str("code").unwrap_or_default().to_string(),
            step: task_record.str("step.Step.short_name").unwrap_or_default().to_string(),
        };

        let software = self.files.host().tool_name();
        let directory = self.convention.work_dir(&self.files.config().project_root, &location, software);
        fs::create_dir_all(&directory).or_raise(|| ErrorKind::InvalidPath(directory.clone()))?;

        let base_name = match name {
            Some(name) => name.to_string(),
            None => format!("{}_{}", location.code, location.step),
        };
        let extension = self.config.extension_for(software);
        let version = version.unwrap_or_else(|| next_version_in(&directory, &base_name, &extension));
        let path = directory.join(format!("{base_name}_v{version:03}{extension}"));
        tracing::debug!(path = %path.display(), version, "Resolved work file path");
        Ok(path)
    }

    /// Save the host's content as the next work file and register it.
    ///
    /// Without a context, one is derived from the file the host has open.
    /// The local save is the operation: if registering it with the tracking
    /// service fails, the save still succeeds and the result carries a note
    /// and a `tracking_error` entry.
    #[tracing::instrument(skip_all)]
    pub fn save_work_file(&mut self, mut options: SaveOptions) -> OperationResult {
        if self.context.is_none()
            && let Some(open) = self.files.host().current_open_path()
            && let Some(context) = self.derive_context(&open)
        {
            self.set_context(context);
        }

        let path = match self.work_file_path(None, None) {
            Ok(path) => path,
            Err(err) => {
                tracing::error!(error = ?err, "Cannot work out work file path");
                return OperationResult::failure(err.failure(), format!("Save failed: {}", *err));
            },
        };

        // The path already carries the next free version.
        options.auto_version.get_or_insert(false);
        let result = self.files.save(&path, options);
        let Some(saved) = result.path().filter(|_| result.is_success()).map(Path::to_path_buf) else {
            return result;
        };

        match self.register_work_file(&saved) {
            Ok(id) => result.with_metadata("sg_published_file_id", id),
            Err(err) => {
                tracing::warn!(error = ?err, path = %saved.display(), "Work file saved but not registered");
                let reason = (*err).to_string();
                result.with_note(format!("not registered with tracking: {reason}")).with_metadata("tracking_error", reason)
            },
        }
    }

    /// Register `path` as a work file of the current task, updating the
    /// record for the same path and task if there is one.
    ///
    /// Returns the record id.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn register_work_file(&self, path: &Path) -> Result<i64> {
        let (context, task) = self.task_context("register work file")?;
        let file_type = self.published_file_type(WORK_FILE_TYPE)?;
        let local_path = json!({ "local_path": path.to_string_lossy() });

        let mut data = Fields::new();
        let code = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        data.insert("code".to_string(), Value::String(code));
        data.insert("path".to_string(), local_path.clone());
        data.insert("task".to_string(), Value::from(task));
        data.insert("entity".to_string(), Value::from(context.entity));
        data.insert("published_file_type".to_string(), Value::from(file_type));
        data.insert("version_number".to_string(), Value::from(version_from_path(path)));
        let description = format!("Work file from {}", self.files.host().tool_name());
        data.insert("description".to_string(), Value::String(description));
        data.insert("sg_status_list".to_string(), Value::from(WORK_FILE_STATUS));

        let existing = self
            .tracking
            .find_one(EntityType::PublishedFile, &[Filter::is("path", local_path), Filter::is("task", task)], &[], &[])
            .or_raise(|| ErrorKind::Tracking)?;
        let record = match existing {
            Some(existing) => {
                tracing::debug!(id = existing.id, "Updating registered work file");
                self.tracking.update(EntityType::PublishedFile, existing.id, &data).or_raise(|| ErrorKind::Tracking)?
            },
            None => {
                self.link_project(&mut data);
                self.tracking.create(EntityType::PublishedFile, &data).or_raise(|| ErrorKind::Tracking)?
            },
        };
        tracing::info!(id = record.id, "Registered work file");
        Ok(record.id)
    }
}
