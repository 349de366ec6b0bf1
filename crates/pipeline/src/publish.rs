//! Publishing work files for review, and finding what was published.

use crate::Synchronizer;
use crate::context::TrackingContext;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nox_files::version::version_from_path;
use nox_files::{Fields, Host, LoadOptions, OperationResult, copy_with_mtime, validate_within_root};
use nox_tracking::{EntityRef, EntityType, Filter, Order};
use serde_json::{Value, json};
use std::path::PathBuf;

/// Status of a new version: waiting for review.
const VERSION_STATUS: &str = "rev";
/// Status of a published file: complete.
const PUBLISHED_STATUS: &str = "cmpt";

/// Arguments for [`Synchronizer::publish`]. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// File to publish. Defaults to the file the host has open.
    pub path: Option<PathBuf>,
    /// File name in the publish directory. Defaults to the source's.
    pub name: Option<String>,
    /// Defaults to the `_v###` number in the source path, or `1`.
    pub version: Option<u64>,
    /// Image attached to the version record, when it exists.
    pub thumbnail: Option<PathBuf>,
    pub description: Option<String>,
}

/// A file copied into the publish tree, not yet recorded remotely.
struct Staged {
    context: TrackingContext,
    task: EntityRef,
    source: PathBuf,
    target: PathBuf,
    version: u64,
}

impl<H: Host> Synchronizer<H> {
    /// Copy a work file into the publish tree and record it for review.
    ///
    /// Creates a version record (pending review) and a published file record
    /// pointing at it. On success the metadata carries `sg_version_id`,
    /// `sg_published_file_id` and `version_number`. A tracking failure after
    /// the copy fails the result but leaves the published copy in place; the
    /// result's path points at it.
    #[tracing::instrument(skip_all)]
    pub fn publish(&mut self, options: PublishOptions) -> OperationResult {
        let staged = match self.stage(&options) {
            Ok(staged) => staged,
            Err(err) => {
                tracing::error!(error = ?err, "Publish failed");
                let result = OperationResult::failure(err.failure(), format!("Publish failed: {}", *err));
                return match &options.path {
                    Some(path) => result.with_path(path),
                    None => result,
                };
            },
        };

        match self.record_publish(&staged, &options) {
            Ok(fields) => {
                tracing::info!(path = %staged.target.display(), version = staged.version, "Published");
                let message = format!("Published successfully: Version {}", staged.version);
                OperationResult::success(&staged.target, message, fields)
            },
            Err(err) => {
                tracing::error!(error = ?err, path = %staged.target.display(), "Published file copied but not recorded");
                OperationResult::failure(err.failure(), format!("Publish failed: {}", *err)).with_path(&staged.target)
            },
        }
    }

    /// Everything local: context, source, version, destination and the copy.
    fn stage(&self, options: &PublishOptions) -> Result<Staged> {
        let (context, task) = self.task_context("publish")?;
        let Some(source) = options.path.clone().or_else(|| self.files.host().current_open_path()) else {
            exn::bail!(ErrorKind::NothingToPublish);
        };
        let source = nox_files::path::resolve(&source).or_raise(|| ErrorKind::InvalidPath(source.clone()))?;
        if !source.is_file() {
            exn::bail!(ErrorKind::NotFound(source));
        }

        let version = options.version.unwrap_or_else(|| version_from_path(&source));
        let target = self.convention.publish_path(&source, options.name.as_deref());
        if target == source {
            // Not inside a work directory; publishing would copy the file onto itself.
            exn::bail!(ErrorKind::InvalidPath(target));
        }
        validate_within_root(&target, &self.files.config().project_root)
            .or_raise(|| ErrorKind::InvalidPath(target.clone()))?;

        if target.exists() {
            tracing::warn!(path = %target.display(), "Replacing existing published file");
        }
        copy_with_mtime(&source, &target).or_raise(|| ErrorKind::Io(target.clone()))?;
        tracing::debug!(source = %source.display(), target = %target.display(), version, "Copied to publish location");
        Ok(Staged { context, task, source, target, version })
    }

    /// The version and published file records for a staged publish.
    fn record_publish(&self, staged: &Staged, options: &PublishOptions) -> Result<Fields> {
        let software = self.files.host().tool_name().to_string();
        let name = staged.target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let target = staged.target.to_string_lossy();

        let user = self
            .tracking
            .find_one(EntityType::HumanUser, &[Filter::is("login", whoami::username())], &["login"], &[])
            .or_raise(|| ErrorKind::Tracking)?;

        let mut version = Fields::new();
        version.insert("code".to_string(), Value::String(name.clone()));
        version.insert("entity".to_string(), Value::from(staged.context.entity));
        version.insert("sg_task".to_string(), Value::from(staged.task));
        version.insert("sg_version_number".to_string(), Value::from(staged.version));
        let description = match &options.description {
            Some(description) => description.clone(),
            None => format!("Published from {software}"),
        };
        version.insert("description".to_string(), Value::String(description));
        if let Some(user) = user {
            version.insert("user".to_string(), Value::from(user.link()));
        }
        version.insert("sg_path_to_frames".to_string(), Value::String(target.to_string()));
        version.insert("sg_status_list".to_string(), Value::from(VERSION_STATUS));
        if let Some(thumbnail) = options.thumbnail.as_deref().filter(|t| t.is_file()) {
            version.insert("image".to_string(), Value::String(thumbnail.to_string_lossy().into_owned()));
        }
        self.link_project(&mut version);
        let version_record = self.tracking.create(EntityType::Version, &version).or_raise(|| ErrorKind::Tracking)?;

        let file_type = self.published_file_type(&software)?;
        let mut published = Fields::new();
        published.insert("code".to_string(), Value::String(name));
        published.insert("path".to_string(), json!({ "local_path": target }));
        published.insert("task".to_string(), Value::from(staged.task));
        published.insert("entity".to_string(), Value::from(staged.context.entity));
        published.insert("version".to_string(), Value::from(version_record.link()));
        published.insert("published_file_type".to_string(), Value::from(file_type));
        published.insert("version_number".to_string(), Value::from(staged.version));
        published.insert("description".to_string(), options.description.clone().map_or(Value::Null, Value::String));
        published.insert("sg_status_list".to_string(), Value::from(PUBLISHED_STATUS));
        self.link_project(&mut published);
        let published_record =
            self.tracking.create(EntityType::PublishedFile, &published).or_raise(|| ErrorKind::Tracking)?;
        tracing::info!(
            version_id = version_record.id,
            published_file_id = published_record.id,
            source = %staged.source.display(),
            "Recorded publish"
        );

        let mut fields = Fields::new();
        fields.insert("sg_version_id".to_string(), Value::from(version_record.id));
        fields.insert("sg_published_file_id".to_string(), Value::from(published_record.id));
        fields.insert("version_number".to_string(), Value::from(staged.version));
        Ok(fields)
    }

    /// Path of the highest-numbered complete publish for the current entity.
    ///
    /// Narrowed to the current task when the context has one, and to the
    /// published file type `type_filter` when given. `None` when nothing
    /// matches.
    ///
    /// # Errors
    /// [`ContextRequired`](ErrorKind::ContextRequired) without a context.
    #[tracing::instrument(skip_all, fields(type_filter = ?type_filter))]
    pub fn latest_publish(&self, type_filter: Option<&str>) -> Result<Option<PathBuf>> {
        let Some(context) = &self.context else {
            exn::bail!(ErrorKind::ContextRequired("latest publish"));
        };
        let mut filters =
            vec![Filter::is("entity", context.entity), Filter::is("sg_status_list", PUBLISHED_STATUS)];
        if let Some(task) = context.task() {
            filters.push(Filter::is("task", task));
        }
        if let Some(type_filter) = type_filter {
            filters.push(Filter::is("published_file_type.PublishedFileType.code", type_filter));
        }

        let latest = self
            .tracking
            .find_one(EntityType::PublishedFile, &filters, &["path", "version_number"], &[Order::desc("version_number")])
            .or_raise(|| ErrorKind::Tracking)?;
        let path = latest.and_then(|record| {
            let local_path = record.get("path")?.get("local_path")?.as_str()?;
            tracing::debug!(id = record.id, version = ?record.i64("version_number"), path = local_path, "Latest publish");
            Some(PathBuf::from(local_path))
        });
        Ok(path)
    }

    /// Open the latest publish in the host.
    ///
    /// Fails with `NotFound` when there is no publish, and with the
    /// [`latest_publish`](Self::latest_publish) error when the lookup fails.
    pub fn load_latest_publish(&mut self, type_filter: Option<&str>, options: LoadOptions) -> OperationResult {
        match self.latest_publish(type_filter) {
            Ok(Some(path)) => self.files.load(&path, options),
            Ok(None) => {
                tracing::info!(?type_filter, "No publish to load");
                OperationResult::failure(nox_files::Failure::NotFound, "No published file found")
            },
            Err(err) => {
                tracing::error!(error = ?err, "Cannot look up latest publish");
                OperationResult::failure(err.failure(), format!("Load failed: {}", *err))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::fixture;
    use nox_files::Failure;
    use nox_tracking::error::ErrorKind as TrackingError;
    use std::fs;
    use std::path::Path;

    fn work_file(root: &Path, name: &str) -> PathBuf {
        let directory = root.join("shots/SQ01/SH010/comp/work/nuke");
        fs::create_dir_all(&directory).unwrap();
        let path = directory.join(name);
        fs::write(&path, "comp script").unwrap();
        path
    }

    #[test]
    fn test_publish_copies_and_records() {
        let fx = fixture();
        let user = fx.mock.insert(EntityType::HumanUser, [("login", json!(whoami::username()))]);
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let source = work_file(fx.root.path(), "SH010_comp_v003.nk");

        let options = PublishOptions { path: Some(source.clone()), ..Default::default() };
        let result = sync.publish(options);
        assert!(result.is_success(), "{}", result.message());
        assert_eq!(result.message(), "Published successfully: Version 3");

        let published = result.path().unwrap();
        assert!(published.ends_with("shots/SQ01/SH010/comp/publish/nuke/SH010_comp_v003.nk"));
        assert_eq!(fs::read_to_string(published).unwrap(), "comp script");
        assert_eq!(
            fs::metadata(published).unwrap().modified().unwrap(),
            fs::metadata(&source).unwrap().modified().unwrap()
        );

        let versions = fx.mock.records(EntityType::Version);
        assert_eq!(versions.len(), 1);
        let version = &versions[0];
        assert_eq!(version.str("sg_status_list"), Some("rev"));
        assert_eq!(version.i64("sg_version_number"), Some(3));
        assert_eq!(version.str("description"), Some("Published from Nuke"));
        assert_eq!(version.entity("user"), Some(EntityRef::new(EntityType::HumanUser, user)));
        assert_eq!(version.entity("sg_task"), Some(EntityRef::new(EntityType::Task, fx.task)));
        assert!(version.get("image").is_none());

        let files = fx.mock.records(EntityType::PublishedFile);
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.str("sg_status_list"), Some("cmpt"));
        assert_eq!(file.entity("version"), Some(version.link()));

        assert_eq!(result.metadata()["sg_version_id"], json!(version.id));
        assert_eq!(result.metadata()["sg_published_file_id"], json!(file.id));
        assert_eq!(result.metadata()["version_number"], json!(3));
    }

    #[test]
    fn test_publish_defaults_to_open_file_and_honours_overrides() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let source = work_file(fx.root.path(), "SH010_comp_v002.nk");
        let thumbnail = fx.root.path().join("thumb.png");
        fs::write(&thumbnail, b"png").unwrap();
        sync.files_mut().host_mut().open = Some(source);

        let options = PublishOptions {
            name: Some("SH010_comp_final.nk".to_string()),
            version: Some(7),
            thumbnail: Some(thumbnail),
            description: Some("Final comp".to_string()),
            ..Default::default()
        };
        let result = sync.publish(options);
        assert!(result.is_success(), "{}", result.message());
        assert!(result.path().unwrap().ends_with("publish/nuke/SH010_comp_final.nk"));
        assert_eq!(result.metadata()["version_number"], json!(7));

        let version = &fx.mock.records(EntityType::Version)[0];
        assert_eq!(version.str("description"), Some("Final comp"));
        assert!(version.str("image").is_some_and(|image| image.ends_with("thumb.png")));
        // No user with this login exists, so the link is left out.
        assert!(version.get("user").is_none());
    }

    #[test]
    fn test_publish_version_comes_from_filename() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let directory = fx.root.path().join("shots/SQ01/SH010/comp/work/nuke_v2");
        fs::create_dir_all(&directory).unwrap();
        let source = directory.join("SH010_comp_v005.nk");
        fs::write(&source, "comp script").unwrap();

        let result = sync.publish(PublishOptions { path: Some(source), ..Default::default() });
        assert!(result.is_success(), "{}", result.message());
        assert_eq!(result.message(), "Published successfully: Version 5");
        assert_eq!(result.metadata()["version_number"], json!(5));
        assert_eq!(fx.mock.records(EntityType::Version)[0].i64("sg_version_number"), Some(5));
    }

    #[test]
    fn test_publish_without_context() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        let source = work_file(fx.root.path(), "SH010_comp_v001.nk");
        let result = sync.publish(PublishOptions { path: Some(source), ..Default::default() });
        assert_eq!(result.failure_kind(), Some(Failure::ContextRequired));
        assert_eq!(fx.mock.call_count(), 0);
    }

    #[test]
    fn test_publish_without_file() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let result = sync.publish(PublishOptions::default());
        assert_eq!(result.failure_kind(), Some(Failure::NothingToPublish));

        let missing = fx.root.path().join("shots/SQ01/SH010/comp/work/nuke/gone_v001.nk");
        let result = sync.publish(PublishOptions { path: Some(missing), ..Default::default() });
        assert_eq!(result.failure_kind(), Some(Failure::NotFound));
    }

    #[test]
    fn test_publish_outside_work_directory() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let source = fx.root.path().join("scratch_v001.nk");
        fs::write(&source, "x").unwrap();
        let result = sync.publish(PublishOptions { path: Some(source), ..Default::default() });
        assert_eq!(result.failure_kind(), Some(Failure::InvalidPath));
        assert!(fx.mock.records(EntityType::Version).is_empty());
    }

    #[test]
    fn test_publish_tracking_failure_keeps_copy() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        let source = work_file(fx.root.path(), "SH010_comp_v001.nk");
        fx.mock.fail_next(1, || TrackingError::Unavailable("timed out".to_string()));

        let result = sync.publish(PublishOptions { path: Some(source), ..Default::default() });
        assert_eq!(result.failure_kind(), Some(Failure::TrackingUnavailable));
        assert!(result.path().unwrap().is_file());
        assert!(fx.mock.records(EntityType::Version).is_empty());
    }

    #[test]
    fn test_latest_publish() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());
        for name in ["SH010_comp_v002.nk", "SH010_comp_v010.nk", "SH010_comp_v009.nk"] {
            let source = work_file(fx.root.path(), name);
            assert!(sync.publish(PublishOptions { path: Some(source), ..Default::default() }).is_success());
        }

        let latest = sync.latest_publish(None).unwrap().unwrap();
        assert!(latest.ends_with("publish/nuke/SH010_comp_v010.nk"));
        assert_eq!(sync.latest_publish(Some("Nuke")).unwrap(), Some(latest));
        assert_eq!(sync.latest_publish(Some("Houdini")).unwrap(), None);
    }

    #[test]
    fn test_latest_publish_requires_context() {
        let fx = fixture();
        let sync = fx.synchronizer();
        let err = sync.latest_publish(None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ContextRequired(_)));
    }

    #[test]
    fn test_load_latest_publish() {
        let fx = fixture();
        let mut sync = fx.synchronizer();
        sync.set_context(fx.context());

        let result = sync.load_latest_publish(None, LoadOptions::default());
        assert_eq!(result.failure_kind(), Some(Failure::NotFound));

        let source = work_file(fx.root.path(), "SH010_comp_v004.nk");
        let published = sync.publish(PublishOptions { path: Some(source), ..Default::default() });
        let result = sync.load_latest_publish(None, LoadOptions::default());
        assert!(result.is_success(), "{}", result.message());
        assert_eq!(result.path(), published.path());
        assert_eq!(sync.files().host().open.as_deref(), published.path());
    }
}
