//! Version suffix parsing and next-version resolution.
//!
//! A versioned file carries a `_v###` suffix immediately before its
//! extension: `SH010_comp_v007.nk`. The number is zero-padded to three
//! digits and simply grows past `999` (`_v1000`). Files that share a
//! directory, base name and extension form one version family.
//!
//! Resolution is a point-in-time directory probe. Two processes resolving
//! against the same directory at the same moment can both pick the same
//! version; enable the advisory [`lock`](crate::lock) to serialize them.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_v(\d+)$").expect("valid regex"));
static ANYWHERE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_v(\d+)").expect("valid regex"));

/// A filename decomposed into its version family and version number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedFile {
    /// Parent directory (empty for bare filenames).
    pub directory: PathBuf,
    /// Stem with any version suffix removed.
    pub base_name: String,
    /// Extension including the leading dot, or empty.
    pub extension: String,
    /// Parsed version suffix, if the stem ends in one.
    pub version: Option<u64>,
}
impl VersionedFile {
    /// Decompose `path`. A `_v<digits>` that is not at the very end of the
    /// stem is not a version suffix: the whole stem is the base name.
    pub fn parse(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let extension = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let parsed = SUFFIX
            .captures(&stem)
            .and_then(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().parse::<u64>().ok()?)));
        let (base_name, version) = match parsed {
            Some((start, version)) => (stem[..start].to_string(), Some(version)),
            None => (stem, None),
        };
        Self { directory, base_name, extension, version }
    }

    /// Filename for `version` within this family.
    pub fn file_name(&self, version: u64) -> String {
        format!("{}_v{:03}{}", self.base_name, version, self.extension)
    }

    /// Full path for `version` within this family.
    pub fn with_version(&self, version: u64) -> PathBuf {
        self.directory.join(self.file_name(version))
    }
}

/// The next version path for `base_path` that does not exist on disk.
///
/// Starts one past the current suffix (or at `1` when there is none) and
/// probes upward until a free filename turns up.
///
/// ```
/// use nox_files::version::resolve_next_version;
///
/// let dir = std::env::temp_dir().join("nox-doc-resolve-next-version");
/// let next = resolve_next_version(dir.join("SH010_comp.nk"));
/// assert!(next.ends_with("SH010_comp_v001.nk"));
/// ```
pub fn resolve_next_version(base_path: impl AsRef<Path>) -> PathBuf {
    let family = VersionedFile::parse(base_path);
    let mut version = family.version.map_or(1, |v| v.saturating_add(1));
    loop {
        let candidate = family.with_version(version);
        if !candidate.exists() {
            tracing::debug!(path = %candidate.display(), version, "Resolved next version");
            return candidate;
        }
        version += 1;
    }
}

/// The next version number for `base_name` + `extension` inside `directory`,
/// one past the highest existing version (or `1`).
///
/// Unlike [`resolve_next_version`], gaps are never filled: with `_v001` and
/// `_v005` present this returns `6`. A missing directory counts as empty.
pub fn next_version_in(directory: impl AsRef<Path>, base_name: &str, extension: &str) -> u64 {
    let pattern = format!(r"^{}_v(\d+){}$", regex::escape(base_name), regex::escape(extension));
    let Ok(pattern) = Regex::new(&pattern) else {
        return 1;
    };
    let Ok(entries) = fs::read_dir(directory.as_ref()) else {
        return 1;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let caps = pattern.captures(name.to_str()?)?;
            caps.get(1)?.as_str().parse::<u64>().ok()
        })
        .max()
        .map_or(1, |highest| highest + 1)
}

/// The version number carried by the filename of `path`, defaulting to `1`.
///
/// The suffix before the extension wins; otherwise the first `_v<digits>`
/// anywhere in the stem is used. Directory names are never consulted.
pub fn version_from_path(path: impl AsRef<Path>) -> u64 {
    let path = path.as_ref();
    if let Some(version) = VersionedFile::parse(path).version {
        return version;
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    ANYWHERE
        .captures(&stem)
        .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[rstest]
    #[case("/show/SH010_comp.nk", "SH010_comp", ".nk", None)]
    #[case("/show/SH010_comp_v007.nk", "SH010_comp", ".nk", Some(7))]
    #[case("/show/SH010_comp_v1000.nk", "SH010_comp", ".nk", Some(1000))]
    #[case("/show/SH010_v002_comp.nk", "SH010_v002_comp", ".nk", None)]
    #[case("/show/layout_v003", "layout", "", Some(3))]
    #[case("/show/cache.v2.bgeo", "cache.v2", ".bgeo", None)]
    fn test_parse(
        #[case] path: &str,
        #[case] base_name: &str,
        #[case] extension: &str,
        #[case] version: Option<u64>,
    ) {
        let parsed = VersionedFile::parse(path);
        assert_eq!(parsed.directory, Path::new("/show"));
        assert_eq!(parsed.base_name, base_name);
        assert_eq!(parsed.extension, extension);
        assert_eq!(parsed.version, version);
    }

    #[rstest]
    #[case(1, "shot_v001.nk")]
    #[case(42, "shot_v042.nk")]
    #[case(999, "shot_v999.nk")]
    #[case(1000, "shot_v1000.nk")]
    fn test_file_name_padding(#[case] version: u64, #[case] expected: &str) {
        assert_eq!(VersionedFile::parse("shot.nk").file_name(version), expected);
    }

    #[test]
    fn test_first_version() {
        let dir = tempfile::tempdir().unwrap();
        let next = resolve_next_version(dir.path().join("test.txt"));
        assert_eq!(next, dir.path().join("test_v001.txt"));
    }

    #[test]
    fn test_contiguous_versions() {
        let dir = tempfile::tempdir().unwrap();
        for v in 1..=4 {
            touch(&dir.path().join(format!("test_v{v:03}.txt")));
        }
        let next = resolve_next_version(dir.path().join("test.txt"));
        assert_eq!(next, dir.path().join("test_v005.txt"));
        touch(&next);
        assert_eq!(resolve_next_version(dir.path().join("test.txt")), dir.path().join("test_v006.txt"));
    }

    #[test]
    fn test_starts_after_existing_suffix() {
        let dir = tempfile::tempdir().unwrap();
        // v001 is free, but the input already names v003.
        let next = resolve_next_version(dir.path().join("test_v003.txt"));
        assert_eq!(next, dir.path().join("test_v004.txt"));
    }

    #[test]
    fn test_grows_past_three_digits() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("test_v999.txt"));
        let next = resolve_next_version(dir.path().join("test_v999.txt"));
        assert_eq!(next, dir.path().join("test_v1000.txt"));
    }

    #[test]
    fn test_other_families_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("test_v001.nk"));
        touch(&dir.path().join("other_v001.txt"));
        let next = resolve_next_version(dir.path().join("test.txt"));
        assert_eq!(next, dir.path().join("test_v001.txt"));
    }

    #[test]
    fn test_next_version_in_skips_gaps() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("SH010_comp_v001.nk"));
        touch(&dir.path().join("SH010_comp_v005.nk"));
        touch(&dir.path().join("SH010_comp_v009.nk.autosave"));
        touch(&dir.path().join("SH010_comp_v010.hip"));
        assert_eq!(next_version_in(dir.path(), "SH010_comp", ".nk"), 6);
        assert_eq!(next_version_in(dir.path(), "SH020_comp", ".nk"), 1);
        assert_eq!(next_version_in(dir.path().join("missing"), "SH010_comp", ".nk"), 1);
    }

    #[test]
    fn test_base_name_is_escaped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a+b_v002.nk"));
        touch(&dir.path().join("aab_v007.nk"));
        assert_eq!(next_version_in(dir.path(), "a+b", ".nk"), 3);
    }

    #[rstest]
    #[case("/show/work/SH010_comp_v012.nk", 12)]
    #[case("/show/work/SH010_comp.nk", 1)]
    #[case("/show/work_v002/SH010_comp.nk", 1)]
    #[case("/show/nuke_v2/SH010_comp_v005.nk", 5)]
    #[case("/show/work/SH010_v003_comp.nk", 3)]
    fn test_version_from_path(#[case] path: &str, #[case] expected: u64) {
        assert_eq!(version_from_path(path), expected);
    }
}
