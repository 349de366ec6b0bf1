//! Plain-file host for the command line.
//!
//! There is no application scene to serialize, so "saving" copies a source
//! file's bytes to the target and "loading" checks that the target can be
//! read.

use nox_files::{Fields, Host, ImportMode};
use serde_json::Value;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

pub struct FileHost {
    software: String,
    source: Option<PathBuf>,
    open: Option<PathBuf>,
}
impl FileHost {
    pub fn new(software: impl Into<String>) -> Self {
        Self { software: software.into(), source: None, open: None }
    }

    /// Content to write on the next save.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Pretend `path` is the file currently open.
    pub fn with_open(mut self, path: impl Into<PathBuf>) -> Self {
        self.open = Some(path.into());
        self
    }
}

impl Host for FileHost {
    fn write_content(&mut self, path: &Path) -> Result<Fields, String> {
        let Some(source) = &self.source else {
            return Err("no source file to save".to_string());
        };
        let bytes = fs::copy(source, path).map_err(|e| format!("{}: {e}", source.display()))?;
        let mut stats = Fields::new();
        stats.insert("source".to_string(), Value::String(source.to_string_lossy().into_owned()));
        stats.insert("bytes".to_string(), Value::from(bytes));
        self.open = Some(path.to_path_buf());
        Ok(stats)
    }

    fn read_content(&mut self, path: &Path, mode: ImportMode) -> Result<(), String> {
        let mut file = File::open(path).map_err(|e| e.to_string())?;
        let bytes = io::copy(&mut file, &mut io::sink()).map_err(|e| e.to_string())?;
        tracing::debug!(path = %path.display(), bytes, ?mode, "Read file");
        if mode == ImportMode::Replace || self.open.is_none() {
            self.open = Some(path.to_path_buf());
        }
        Ok(())
    }

    fn current_open_path(&self) -> Option<PathBuf> {
        self.open.clone()
    }

    fn tool_name(&self) -> &str {
        &self.software
    }

    fn tool_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_copies_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("render.exr");
        fs::write(&source, b"pixels").unwrap();
        let target = dir.path().join("copy.exr");

        let mut host = FileHost::new("Nuke").with_source(&source);
        let stats = host.write_content(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"pixels");
        assert_eq!(stats["bytes"], Value::from(6));
        assert_eq!(host.current_open_path(), Some(target));
    }

    #[test]
    fn test_save_without_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut host = FileHost::new("Nuke");
        assert!(host.write_content(&dir.path().join("a.nk")).is_err());
    }

    #[test]
    fn test_merge_keeps_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.nk"), dir.path().join("b.nk"));
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let mut host = FileHost::new("Nuke").with_open(&a);
        host.read_content(&b, ImportMode::Merge).unwrap();
        assert_eq!(host.current_open_path(), Some(a));
        host.read_content(&b, ImportMode::Replace).unwrap();
        assert_eq!(host.current_open_path(), Some(b));
        assert!(host.read_content(&dir.path().join("missing.nk"), ImportMode::Replace).is_err());
    }
}
