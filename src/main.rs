mod error;
mod host;

use crate::error::{ErrorKind, Result};
use crate::host::FileHost;
use clap::{Args, Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use nox_config::Config;
use nox_files::{BackupOutcome, FileManager, Fields, ImportMode, LoadOptions, OperationResult, SaveOptions};
use nox_files::{backup, sidecar, version};
use nox_pipeline::{PublishOptions, Synchronizer, TrackingContext};
use nox_tracking::{EntityRef, EntityType};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NOX_LOG";

#[derive(Debug, Parser)]
#[command(name = "nox", version, about = "Versioned saves, backups and production-tracking sync for pipeline files")]
struct Cli {
    /// Configuration file; discovered from NOX_CONFIG_PATH, ~/.nox and /etc/nox otherwise
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Override the configured project root
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Application the files belong to; picks the work file extension and folder
    #[arg(long, global = true, env = "NOX_SOFTWARE", default_value = "Generic")]
    software: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the next free versioned path for a file
    Version { path: PathBuf },
    /// Save a copy of SOURCE to TARGET, versioned and backed up, with a sidecar
    Save {
        source: PathBuf,
        target: PathBuf,
        /// Overwrite TARGET instead of picking the next version
        #[arg(long)]
        no_version: bool,
        #[arg(long)]
        no_backup: bool,
        /// Extra sidecar entry; values parse as JSON where they can
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
        metadata: Vec<(String, Value)>,
    },
    /// Open a file, reporting its sidecar metadata
    Load {
        path: PathBuf,
        /// Merge into the open file instead of replacing it
        #[arg(long)]
        merge: bool,
    },
    /// Print a file's sidecar metadata
    Meta { path: PathBuf },
    /// Archive a file into its backup directory
    Backup { path: PathBuf },
    /// Apply backup retention to a file's archives
    Prune {
        path: PathBuf,
        /// Archives to keep; defaults to the configured backup count
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Show the tracking context a path belongs to
    Context { path: PathBuf },
    /// Save SOURCE as the next work file of a task and register it
    Work {
        source: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Copy a work file into the publish tree and record it for review
    Publish {
        path: PathBuf,
        /// File name in the publish directory
        #[arg(long)]
        name: Option<String>,
        /// Version number; read from the file name otherwise
        #[arg(long)]
        version: Option<u64>,
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Find the latest complete publish for a shot or asset
    Latest {
        /// Any path inside the shot or asset's tree
        path: Option<PathBuf>,
        /// Published file type, e.g. Nuke
        #[arg(long = "type")]
        type_filter: Option<String>,
        /// Open the publish instead of printing its path
        #[arg(long)]
        load: bool,
        #[command(flatten)]
        context: ContextArgs,
    },
}

/// Explicit tracking context; derived from the path when omitted.
#[derive(Debug, Args)]
struct ContextArgs {
    /// Shot or Asset
    #[arg(long, requires = "entity_id")]
    entity_type: Option<String>,
    #[arg(long, requires = "entity_type")]
    entity_id: Option<i64>,
    #[arg(long, requires = "entity_id")]
    task_id: Option<i64>,
}
impl ContextArgs {
    fn explicit(&self) -> Result<Option<TrackingContext>> {
        let (Some(name), Some(id)) = (&self.entity_type, self.entity_id) else {
            return Ok(None);
        };
        let Some(entity_type) = EntityType::from_name(name) else {
            exn::bail!(ErrorKind::InvalidArgument(format!("unknown entity type {name:?}")));
        };
        let mut context = TrackingContext::new(EntityRef::new(entity_type, id));
        context.task_id = self.task_id;
        Ok(Some(context))
    }

    /// The explicit context, or the one `path` sits in.
    fn resolve(&self, sync: &Synchronizer<FileHost>, path: Option<&Path>) -> Result<TrackingContext> {
        if let Some(context) = self.explicit()? {
            return Ok(context);
        }
        let path = path.unwrap_or_else(|| Path::new("."));
        sync.derive_context(path).ok_or_raise(|| ErrorKind::NoContext(path.to_path_buf()))
    }
}

fn parse_meta(entry: &str) -> std::result::Result<(String, Value), String> {
    let Some((key, value)) = entry.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got {entry:?}"));
    };
    if key.is_empty() {
        return Err("metadata key is empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = ?err, "Command failed");
            eprintln!("error: {}", *err);
            ExitCode::from(2)
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Run one command. `Ok(false)` means it ran and reported a failure.
fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(root) = cli.root {
        config.project_root = root;
    }
    let software = cli.software;

    match cli.command {
        Command::Version { path } => {
            println!("{}", version::resolve_next_version(&path).display());
            Ok(true)
        },
        Command::Save { source, target, no_version, no_backup, metadata } => {
            let mut files = FileManager::new(config.file_manager(), FileHost::new(software).with_source(source));
            let options = SaveOptions {
                auto_version: no_version.then_some(false),
                backup: no_backup.then_some(false),
                metadata: metadata.into_iter().collect::<Fields>(),
            };
            report(&files.save(&target, options))
        },
        Command::Load { path, merge } => {
            let mut files = FileManager::new(config.file_manager(), FileHost::new(software));
            let import_mode = if merge { ImportMode::Merge } else { ImportMode::Replace };
            report(&files.load(&path, LoadOptions { import_mode }))
        },
        Command::Meta { path } => match sidecar::read(&path) {
            Some(document) => print_json(&document).map(|_| true),
            None => {
                eprintln!("no metadata for {}", path.display());
                Ok(false)
            },
        },
        Command::Backup { path } => match backup::backup_if_needed(&config.file_manager(), &path) {
            BackupOutcome::Created(archive) => {
                println!("{}", archive.display());
                Ok(true)
            },
            BackupOutcome::Skipped => {
                eprintln!("nothing to back up");
                Ok(true)
            },
            BackupOutcome::Failed(reason) => {
                eprintln!("backup failed: {reason}");
                Ok(false)
            },
        },
        Command::Prune { path, keep } => {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let keep = keep.unwrap_or(config.file_manager.backup_count);
            let pruned = backup::prune(&stem, &backup::backup_dir(&path), keep);
            print_json(&json!({ "retained": pruned.retained, "removed": pruned.removed })).map(|_| true)
        },
        Command::Context { path } => {
            let sync = synchronizer(&config, FileHost::new(software))?;
            let context = sync.derive_context(&path).ok_or_raise(|| ErrorKind::NoContext(path.clone()))?;
            print_json(&context.to_fields()).map(|_| true)
        },
        Command::Work { source, context } => {
            let host = FileHost::new(software).with_source(&source).with_open(&source);
            let mut sync = synchronizer(&config, host)?;
            if let Some(context) = context.explicit()? {
                sync.set_context(context);
            }
            report(&sync.save_work_file(SaveOptions::default()))
        },
        Command::Publish { path, name, version, thumbnail, description, context } => {
            let mut sync = synchronizer(&config, FileHost::new(software).with_open(&path))?;
            let resolved = context.resolve(&sync, Some(&path))?;
            sync.set_context(resolved);
            let options = PublishOptions { path: Some(path), name, version, thumbnail, description };
            report(&sync.publish(options))
        },
        Command::Latest { path, type_filter, load, context } => {
            let mut sync = synchronizer(&config, FileHost::new(software))?;
            let resolved = context.resolve(&sync, path.as_deref())?;
            sync.set_context(resolved);
            if load {
                return report(&sync.load_latest_publish(type_filter.as_deref(), LoadOptions::default()));
            }
            match sync.latest_publish(type_filter.as_deref()).or_raise(|| ErrorKind::Lookup)? {
                Some(latest) => {
                    println!("{}", latest.display());
                    Ok(true)
                },
                None => {
                    eprintln!("no publish found");
                    Ok(false)
                },
            }
        },
    }
}

fn synchronizer(config: &Config, host: FileHost) -> Result<Synchronizer<FileHost>> {
    let tracking = nox_tracking::connect(&config.shotgrid).or_raise(|| ErrorKind::Tracking)?;
    let files = FileManager::new(config.file_manager(), host);
    Ok(Synchronizer::new(files, tracking, config.clone()))
}

/// Print `result` and report whether it succeeded.
fn report(result: &OperationResult) -> Result<bool> {
    print_json(result)?;
    Ok(result.is_success())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).or_raise(|| ErrorKind::Output)?;
    println!("{rendered}");
    Ok(())
}
