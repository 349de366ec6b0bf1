//! Project root validation.
//!
//! Every save and load must stay inside the configured project root. Paths
//! are compared after resolution: made absolute against the working
//! directory, lexically normalized (`.` and `..` collapsed) and with the
//! deepest existing ancestor canonicalized so that symlinks resolve the same
//! way for the candidate and the root. The candidate does not have to exist.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute, normalized form.
///
/// Unlike [`fs::canonicalize`] this works for paths that don't exist (yet):
/// only the longest existing prefix is canonicalized, and the remaining
/// components are appended as-is.
///
/// Null bytes are rejected with [`InvalidPath`](ErrorKind::InvalidPath).
pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().as_encoded_bytes().contains(&0) {
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    let absolute = std::path::absolute(path).or_raise(|| ErrorKind::InvalidPath(path.to_path_buf()))?;
    let normalized = normalize(&absolute);

    let mut existing = normalized.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return Ok(tail.into_iter().rev().fold(canonical, |acc, part| acc.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            },
            // Nothing on the way up exists (not even the filesystem root),
            // so the lexical form is the best we can do.
            _ => return Ok(normalized),
        }
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// `..` above the root stays at the root, mirroring how the OS treats `/..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => out.push(component),
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
        }
    }
    out
}

/// Returns `true` if `path` resolves to `root` or somewhere beneath it.
///
/// Containment is component-based: `/projects/show2` is not inside
/// `/projects/show`.
pub fn is_within_root(path: impl AsRef<Path>, root: impl AsRef<Path>) -> bool {
    match (resolve(path), resolve(root)) {
        (Ok(path), Ok(root)) => path.starts_with(root),
        _ => false,
    }
}

/// Validate that `path` is inside `root`, creating its parent directory if
/// needed.
///
/// # Errors
/// [`InvalidPath`](ErrorKind::InvalidPath) when the path resolves outside
/// the root, or when its parent directory does not exist and cannot be
/// created.
pub fn validate_within_root(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !is_within_root(path, root.as_ref()) {
        tracing::warn!(path = %path.display(), root = %root.as_ref().display(), "Path outside project root");
        exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).or_raise(|| {
            tracing::error!(directory = %parent.display(), "Cannot create directory");
            ErrorKind::InvalidPath(path.to_path_buf())
        })?;
    }
    Ok(())
}
