//! Configuration loading for the nox pipeline tools.
//!
//! Configuration is layered with [`figment`]:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. The `NOX_PROJECT_ROOT` environment variable, replacing the default
//!    project root.
//! 3. A config file (YAML, JSON or TOML, chosen by extension), merged on top.
//!    Loaded values win per key, and nested tables merge key-by-key rather
//!    than replacing the whole table.
//!
//! The config file is the first that exists out of: an explicit path, the
//! `NOX_CONFIG_PATH` environment variable, `~/.nox/nox_pipeline.yaml` and
//! `/etc/nox/nox_pipeline.yaml`. Having no config file at all is fine.
//!
//! ```
//! use nox_config::Config;
//!
//! let config = Config::default();
//! let runtime = config.file_manager();
//! assert_eq!(runtime.backup_count, 5);
//! assert_eq!(config.extension_for("Nuke"), ".nk");
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable overriding the built-in project root.
pub const PROJECT_ROOT_ENV: &str = "NOX_PROJECT_ROOT";
/// Environment variable pointing at a config file.
pub const CONFIG_PATH_ENV: &str = "NOX_CONFIG_PATH";

const DEFAULT_PROJECT_ROOT: &str = "/mnt/projects";
const CONFIG_FILE_NAME: &str = "nox_pipeline.yaml";
const SYSTEM_CONFIG_PATH: &str = "/etc/nox/nox_pipeline.yaml";
const FALLBACK_EXTENSION: &str = ".file";

/// Top-level configuration, as deserialized from the merged figment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sanctioned directory boundary for every save and load.
    pub project_root: PathBuf,
    pub file_manager: FileManagerSettings,
    /// Production-tracking service connection.
    pub shotgrid: TrackingSettings,
    /// Work-file extension (without the dot) per producing application,
    /// keyed by lower-cased application name with spaces as underscores.
    pub software_extensions: BTreeMap<String, String>,
}
impl Default for Config {
    fn default() -> Self {
        let software_extensions = [
            ("nuke", "nk"),
            ("houdini", "hip"),
            ("maya", "ma"),
            ("blender", "blend"),
            ("mocha", "mocha"),
            ("silhouette", "sfx"),
            ("3dequalizer", "3de"),
            ("substance_painter", "spp"),
        ]
        .into_iter()
        .map(|(software, ext)| (software.to_string(), ext.to_string()))
        .collect();
        Self {
            project_root: PathBuf::from(DEFAULT_PROJECT_ROOT),
            file_manager: FileManagerSettings::default(),
            shotgrid: TrackingSettings::default(),
            software_extensions,
        }
    }
}

/// The `file_manager` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileManagerSettings {
    pub auto_version: bool,
    pub backup_enabled: bool,
    pub backup_count: usize,
    pub validate_on_load: bool,
    pub metadata_enabled: bool,
    /// Hold an advisory lock file per version family while saving.
    pub lock_versions: bool,
}
impl Default for FileManagerSettings {
    fn default() -> Self {
        Self {
            auto_version: true,
            backup_enabled: true,
            backup_count: 5,
            validate_on_load: true,
            metadata_enabled: true,
            lock_versions: false,
        }
    }
}

/// The `shotgrid` section of the config file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Site URL, e.g. `https://studio.shotgrid.autodesk.com`.
    pub url: String,
    /// When set, records created by the pipeline are linked to this project.
    pub project_id: Option<i64>,
    pub script_name: String,
    pub api_key: String,
    /// Timeout applied to every remote call.
    pub timeout_secs: u64,
    /// Total attempts per remote call, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}
impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            url: "https://nox.shotgridstudio.com".to_string(),
            project_id: None,
            script_name: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            max_attempts: 4,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}
impl fmt::Debug for TrackingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingSettings")
            .field("url", &self.url)
            .field("project_id", &self.project_id)
            .field("script_name", &self.script_name)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff_ms", &self.initial_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .finish()
    }
}

/// Runtime configuration consumed by every save and load call.
///
/// Built once from [`Config::file_manager`] and handed to the file manager,
/// which owns it from then on. Fields are public so that a host integration
/// can flip behaviour for the rest of its session by direct assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManagerConfig {
    pub project_root: PathBuf,
    pub auto_version: bool,
    pub backup_enabled: bool,
    pub backup_count: usize,
    pub validate_on_load: bool,
    pub metadata_enabled: bool,
    pub lock_versions: bool,
}
impl FileManagerConfig {
    /// Defaults for everything except the project root.
    pub fn with_root(project_root: impl Into<PathBuf>) -> Self {
        Config { project_root: project_root.into(), ..Config::default() }.file_manager()
    }
}
impl Default for FileManagerConfig {
    fn default() -> Self {
        Config::default().file_manager()
    }
}

impl Config {
    /// Load configuration, discovering the config file if `explicit` is `None`.
    ///
    /// An explicit path that does not exist is an error; discovered paths
    /// are only used when they exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit
            && !path.is_file()
        {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let file = explicit.map(Path::to_path_buf).or_else(Self::discover);
        match &file {
            Some(path) => tracing::debug!(path = %path.display(), "Loading configuration file"),
            None => tracing::debug!("No configuration file found; using defaults"),
        }
        Self::extract(Self::figment(file.as_deref()))
    }

    /// Build the layered figment: defaults, then environment, then `file`.
    pub fn figment(file: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::raw().only(&[PROJECT_ROOT_ENV]).map(|_| "project_root".into()));
        match file {
            Some(path) => Self::merge_file(figment, path),
            None => figment,
        }
    }

    /// Deserialize a (possibly customised) figment into a [`Config`].
    pub fn extract(figment: Figment) -> Result<Self> {
        figment.extract().or_raise(|| ErrorKind::Invalid)
    }

    fn merge_file(figment: Figment, path: &Path) -> Figment {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => figment.merge(Json::file(path)),
            Some("toml") => figment.merge(Toml::file(path)),
            _ => figment.merge(Yaml::file(path)),
        }
    }

    /// First existing config file out of the well-known locations.
    fn discover() -> Option<PathBuf> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()).map(PathBuf::from);
        let from_home = BaseDirs::new().map(|dirs| dirs.home_dir().join(".nox").join(CONFIG_FILE_NAME));
        [from_env, from_home, Some(PathBuf::from(SYSTEM_CONFIG_PATH))].into_iter().flatten().find(|p| p.is_file())
    }

    /// The runtime file manager configuration for this config.
    pub fn file_manager(&self) -> FileManagerConfig {
        let settings = &self.file_manager;
        FileManagerConfig {
            project_root: self.project_root.clone(),
            auto_version: settings.auto_version,
            backup_enabled: settings.backup_enabled,
            backup_count: settings.backup_count,
            validate_on_load: settings.validate_on_load,
            metadata_enabled: settings.metadata_enabled,
            lock_versions: settings.lock_versions,
        }
    }

    /// Work-file extension (with leading dot) for the named application.
    pub fn extension_for(&self, software: &str) -> String {
        let key = software.trim().to_lowercase().replace(' ', "_");
        match self.software_extensions.get(&key) {
            Some(ext) => format!(".{}", ext.trim_start_matches('.')),
            None => FALLBACK_EXTENSION.to_string(),
        }
    }
}
