//! Sidecar metadata store.
//!
//! Every content file may have a JSON sidecar next to it, found by replacing
//! the content extension with `.meta.json` (`SH010_comp_v003.nk` gets
//! `SH010_comp_v003.meta.json`). The document always carries:
//!
//! | Key        | Value                                  |
//! |------------|----------------------------------------|
//! | `file`     | Basename of the content file           |
//! | `saved_at` | RFC 3339 timestamp of the save         |
//! | `software` | Producing application                  |
//! | `version`  | Producing application version          |
//! | `user`     | OS user that saved                     |
//! | `host`     | Hostname the save happened on          |
//!
//! plus any free-form keys supplied by the host and the caller, which win
//! over the fixed keys on collision. A sidecar is rewritten wholesale on
//! every save; nothing from the previous document survives.

use crate::error::{ErrorKind, Result};
use crate::result::Fields;
use exn::ResultExt;
use nox_config::FileManagerConfig;
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

const SIDECAR_EXTENSION: &str = "meta.json";

/// Identity of the application producing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub software: String,
    pub version: String,
}

/// What happened to the sidecar during a save. Never fails the save itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// Metadata is disabled in configuration.
    Disabled,
    Written(PathBuf),
    Failed(String),
}

/// Sidecar location for a content file.
pub fn sidecar_path(content_path: impl AsRef<Path>) -> PathBuf {
    content_path.as_ref().with_extension(SIDECAR_EXTENSION)
}

/// Build the sidecar document: fixed keys first, then `fields` on top.
pub fn compose(content_path: &Path, producer: &Producer, fields: &Fields) -> Fields {
    let saved_at = crate::now().format(&Rfc3339).unwrap_or_default();
    let host = whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string());
    let file = content_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut document = Fields::new();
    document.insert("file".to_string(), Value::String(file));
    document.insert("saved_at".to_string(), Value::String(saved_at));
    document.insert("software".to_string(), Value::String(producer.software.clone()));
    document.insert("version".to_string(), Value::String(producer.version.clone()));
    document.insert("user".to_string(), Value::String(whoami::username()));
    document.insert("host".to_string(), Value::String(host));
    document.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    document
}

/// Write the sidecar for `content_path`, unless metadata is disabled.
///
/// Failures are logged and reported through [`MetadataOutcome::Failed`].
#[tracing::instrument(level = "debug", skip_all, fields(path = %content_path.display()))]
pub fn write(config: &FileManagerConfig, content_path: &Path, producer: &Producer, fields: &Fields) -> MetadataOutcome {
    if !config.metadata_enabled {
        return MetadataOutcome::Disabled;
    }
    let document = compose(content_path, producer, fields);
    match write_document(content_path, &document) {
        Ok(path) => MetadataOutcome::Written(path),
        Err(err) => {
            tracing::warn!(error = ?err, "Failed to save metadata");
            MetadataOutcome::Failed((*err).to_string())
        },
    }
}

/// Serialize `document` next to `content_path`.
///
/// The JSON goes to a temporary file in the same directory first and is
/// renamed into place, so readers never observe a half-written sidecar.
pub fn write_document(content_path: &Path, document: &Fields) -> Result<PathBuf> {
    let path = sidecar_path(content_path);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Same mode as a plain create (0666 less the umask), so other users can read it.
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let temp = builder.tempfile_in(directory).map_err(|e| ErrorKind::io(e, directory))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer_pretty(&mut writer, document).or_raise(|| ErrorKind::Metadata)?;
        writer.write_all(b"\n").map_err(|e| ErrorKind::io(e, &path))?;
        writer.flush().map_err(|e| ErrorKind::io(e, &path))?;
    }
    temp.persist(&path).map_err(|e| ErrorKind::io(e.error, &path))?;
    Ok(path)
}

/// Read the sidecar for `content_path`.
///
/// A missing sidecar is `None`. So is one that can't be read or parsed, which
/// is logged rather than raised.
pub fn read(content_path: impl AsRef<Path>) -> Option<Fields> {
    let path = sidecar_path(content_path);
    let contents = match fs::read(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to load metadata");
            return None;
        },
    };
    match serde_json::from_slice::<Fields>(&contents) {
        Ok(document) => Some(document),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to load metadata");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn producer() -> Producer {
        Producer { software: "Nuke".to_string(), version: "15.1v3".to_string() }
    }

    fn config(root: &Path) -> FileManagerConfig {
        FileManagerConfig::with_root(root)
    }

    #[rstest]
    #[case("/show/SH010_comp_v003.nk", "/show/SH010_comp_v003.meta.json")]
    #[case("/show/cache.v2.bgeo", "/show/cache.v2.meta.json")]
    #[case("/show/README", "/show/README.meta.json")]
    fn test_sidecar_path(#[case] content: &str, #[case] expected: &str) {
        assert_eq!(sidecar_path(content), Path::new(expected));
    }

    #[cfg(unix)]
    #[test]
    fn test_sidecar_mode_matches_content_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("SH010_comp_v001.nk");
        fs::write(&content, "comp script").unwrap();
        let path = write_document(&content, &Fields::new()).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&content));
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("SH010_comp_v001.nk");
        let mut fields = Fields::new();
        fields.insert("k".to_string(), json!("v"));

        let outcome = write(&config(dir.path()), &content, &producer(), &fields);
        assert_eq!(outcome, MetadataOutcome::Written(dir.path().join("SH010_comp_v001.meta.json")));

        let document = read(&content).unwrap();
        assert_eq!(document["k"], json!("v"));
        assert_eq!(document["file"], json!("SH010_comp_v001.nk"));
        assert_eq!(document["software"], json!("Nuke"));
        assert_eq!(document["version"], json!("15.1v3"));
        for key in ["saved_at", "user", "host"] {
            assert!(document[key].is_string(), "missing fixed key {key}");
        }
    }

    #[test]
    fn test_caller_fields_override_fixed_keys() {
        let mut fields = Fields::new();
        fields.insert("software".to_string(), json!("NukeX"));
        let document = compose(Path::new("/show/a.nk"), &producer(), &fields);
        assert_eq!(document["software"], json!("NukeX"));
        assert_eq!(document["version"], json!("15.1v3"));
    }

    #[test]
    fn test_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("a.nk");
        let mut first = Fields::new();
        first.insert("custom".to_string(), json!(1));
        write(&config(dir.path()), &content, &producer(), &first);
        write(&config(dir.path()), &content, &producer(), &Fields::new());
        assert!(!read(&content).unwrap().contains_key("custom"));
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("a.nk");
        let mut config = config(dir.path());
        config.metadata_enabled = false;
        assert_eq!(write(&config, &content, &producer(), &Fields::new()), MetadataOutcome::Disabled);
        assert!(!sidecar_path(&content).exists());
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("missing-dir/a.nk");
        let outcome = write(&config(dir.path()), &content, &producer(), &Fields::new());
        assert!(matches!(outcome, MetadataOutcome::Failed(_)));
    }

    #[test]
    fn test_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read(dir.path().join("nothing.nk")), None);
    }

    #[test]
    fn test_read_unparsable() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("broken.nk");
        fs::write(sidecar_path(&content), b"{ not json").unwrap();
        assert_eq!(read(&content), None);
    }
}
