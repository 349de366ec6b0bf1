use crate::context::TrackingContext;
use crate::convention::{PathConvention, StudioConvention};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nox_config::Config;
use nox_files::{FileManager, Host};
use nox_tracking::{EntityRef, EntityType, Fields, Filter, TrackingHandle};
use serde_json::Value;
use std::path::Path;

/// Keeps a host's files in step with the production-tracking service.
///
/// Owns the [`FileManager`] for the host and layers tracking on top of it:
/// work-file paths come from the current [`TrackingContext`], saved work
/// files are registered as records, and publishes copy the work file to the
/// publish tree and create the records reviewers see.
///
/// Remote failures never escape as panics or errors from the operations that
/// return an [`OperationResult`](nox_files::OperationResult); a local save
/// that succeeded stays saved even when registration fails.
pub struct Synchronizer<H: Host> {
    pub(crate) files: FileManager<H>,
    pub(crate) tracking: TrackingHandle,
    pub(crate) convention: Box<dyn PathConvention>,
    pub(crate) config: Config,
    pub(crate) context: Option<TrackingContext>,
}
impl<H: Host> Synchronizer<H> {
    pub fn new(files: FileManager<H>, tracking: TrackingHandle, config: Config) -> Self {
        Self { files, tracking, convention: Box::new(StudioConvention), config, context: None }
    }

    /// Replace the directory convention.
    pub fn with_convention(mut self, convention: impl PathConvention + 'static) -> Self {
        self.convention = Box::new(convention);
        self
    }

    pub fn files(&self) -> &FileManager<H> {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileManager<H> {
        &mut self.files
    }

    pub fn context(&self) -> Option<&TrackingContext> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: TrackingContext) {
        tracing::info!(entity = %context.entity.entity_type, entity_id = context.entity.id, task_id = ?context.task_id, "Tracking context set");
        self.context = Some(context);
    }

    pub fn clear_context(&mut self) {
        self.context = None;
    }

    /// Work out the tracking context for `path` from the directory layout.
    ///
    /// `None` when the path doesn't follow the layout, the entity isn't
    /// tracked, or the service fails (which is logged). A matching entity
    /// without a task for the step still yields a context, minus the task.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn derive_context(&self, path: &Path) -> Option<TrackingContext> {
        let location = self.convention.parse(path)?;
        match self.lookup_context(location.entity_type, &location.code, &location.step) {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(error = ?err, "Could not derive tracking context from path");
                None
            },
        }
    }

    fn lookup_context(&self, entity_type: EntityType, code: &str, step: &str) -> Result<Option<TrackingContext>> {
        let entity = self
            .tracking
            .find_one(entity_type, &[Filter::is("code", code)], &["code"], &[])
            .or_raise(|| ErrorKind::Tracking)?;
        let Some(entity) = entity else {
            tracing::debug!(%entity_type, code, "Entity not tracked");
            return Ok(None);
        };
        let task = self
            .tracking
            .find_one(
                EntityType::Task,
                &[Filter::is("entity", entity.link()), Filter::is("step.Step.short_name", step)],
                &["step"],
                &[],
            )
            .or_raise(|| ErrorKind::Tracking)?;

        let mut context = TrackingContext::new(entity.link());
        context.entity_code = Some(entity.str("code").unwrap_or(code).to_string());
        if let Some(task) = task {
            context.task_id = Some(task.id);
            context.step_id = task.entity("step").map(|step| step.id);
        }
        Ok(Some(context))
    }

    /// Context with a task, or [`ContextRequired`](ErrorKind::ContextRequired).
    pub(crate) fn task_context(&self, operation: &'static str) -> Result<(TrackingContext, EntityRef)> {
        let Some(context) = self.context.clone() else {
            exn::bail!(ErrorKind::ContextRequired(operation));
        };
        let Some(task) = context.task() else {
            exn::bail!(ErrorKind::ContextRequired(operation));
        };
        Ok((context, task))
    }

    /// Add the configured project link to a record about to be created.
    pub(crate) fn link_project(&self, data: &mut Fields) {
        if let Some(project_id) = self.config.shotgrid.project_id {
            data.insert("project".to_string(), Value::from(EntityRef::new(EntityType::Project, project_id)));
        }
    }

    /// Find a published file type by code, creating it if it doesn't exist.
    pub(crate) fn published_file_type(&self, code: &str) -> Result<EntityRef> {
        let existing = self
            .tracking
            .find_one(EntityType::PublishedFileType, &[Filter::is("code", code)], &["code"], &[])
            .or_raise(|| ErrorKind::Tracking)?;
        if let Some(existing) = existing {
            return Ok(existing.link());
        }
        let mut data = Fields::new();
        data.insert("code".to_string(), Value::from(code));
        self.link_project(&mut data);
        let created = self.tracking.create(EntityType::PublishedFileType, &data).or_raise(|| ErrorKind::Tracking)?;
        tracing::info!(code, id = created.id, "Created published file type");
        Ok(created.link())
    }
}
