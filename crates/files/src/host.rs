//! The host application seam.
//!
//! The file manager never touches content formats. Saving and opening are
//! delegated to a [`Host`], implemented once per DCC application (or by a
//! plain file copier for command-line use), and everything around that call
//! (paths, versions, backups, sidecars) is handled here.

use crate::result::Fields;
use std::path::{Path, PathBuf};

/// How loaded content combines with what the host already has open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Discard the current scene and open the file in its place.
    #[default]
    Replace,
    /// Bring the file's content into the current scene.
    Merge,
}

/// Capabilities a host application provides to the file manager.
///
/// # Examples
///
/// ```
/// use nox_files::{Fields, Host, ImportMode};
/// use std::path::{Path, PathBuf};
///
/// struct Notepad {
///     open: Option<PathBuf>,
///     text: String,
/// }
///
/// impl Host for Notepad {
///     fn write_content(&mut self, path: &Path) -> Result<Fields, String> {
///         std::fs::write(path, &self.text).map_err(|e| e.to_string())?;
///         self.open = Some(path.to_path_buf());
///         let mut stats = Fields::new();
///         stats.insert("characters".into(), self.text.len().into());
///         Ok(stats)
///     }
///
///     fn read_content(&mut self, path: &Path, mode: ImportMode) -> Result<(), String> {
///         let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
///         match mode {
///             ImportMode::Replace => self.text = text,
///             ImportMode::Merge => self.text.push_str(&text),
///         }
///         self.open = Some(path.to_path_buf());
///         Ok(())
///     }
///
///     fn current_open_path(&self) -> Option<PathBuf> {
///         self.open.clone()
///     }
///
///     fn tool_name(&self) -> &str {
///         "Notepad"
///     }
///
///     fn tool_version(&self) -> String {
///         "1.0".into()
///     }
/// }
/// ```
pub trait Host {
    /// Save the current scene to `path`, returning scene statistics.
    ///
    /// The statistics end up in the sidecar and in the operation result.
    fn write_content(&mut self, path: &Path) -> Result<Fields, String>;

    /// Open or import `path`.
    fn read_content(&mut self, path: &Path, mode: ImportMode) -> Result<(), String>;

    /// The file currently open in the host, if it has one.
    fn current_open_path(&self) -> Option<PathBuf>;

    /// Application name, e.g. `Nuke`.
    fn tool_name(&self) -> &str;

    /// Application version string.
    fn tool_version(&self) -> String;
}
