//! Project directory convention.
//!
//! Work files live in a fixed layout under the project root:
//!
//! ```text
//! <root>/shots/<sequence>/<shot>/<step>/work/<software>/<shot>_<step>_v###<ext>
//! <root>/assets/<asset type>/<asset>/<step>/work/<software>/<asset>_<step>_v###<ext>
//! ```
//!
//! and publishes mirror them with the `work` directory swapped for
//! `publish`. The layout is behind [`PathConvention`] so that a studio with a
//! different tree can swap it without touching the synchronizer.

use nox_tracking::EntityType;
use std::path::{Component, Path, PathBuf};

const SHOTS_DIR: &str = "shots";
const ASSETS_DIR: &str = "assets";
const WORK_DIR: &str = "work";
const PUBLISH_DIR: &str = "publish";

/// Where an entity's files live, as read from (or written into) a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// [`Shot`](EntityType::Shot) or [`Asset`](EntityType::Asset).
    pub entity_type: EntityType,
    /// Sequence code for shots, asset type for assets.
    pub group: String,
    /// Shot or asset code.
    pub code: String,
    /// Pipeline step short name (`comp`, `light`, `model`...).
    pub step: String,
}

/// A studio directory layout.
pub trait PathConvention: Send + Sync {
    /// Read the entity location out of `path`. Best effort: `None` when the
    /// path doesn't follow the layout.
    fn parse(&self, path: &Path) -> Option<Location>;

    /// Work directory for `location` and application `software`.
    fn work_dir(&self, root: &Path, location: &Location, software: &str) -> PathBuf;

    /// Publish destination for `work_path`, optionally renamed to `name`.
    fn publish_path(&self, work_path: &Path, name: Option<&str>) -> PathBuf;
}

/// The `shots/` + `assets/` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudioConvention;

impl PathConvention for StudioConvention {
    fn parse(&self, path: &Path) -> Option<Location> {
        let parts: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        let (entity_type, index) = match parts.iter().position(|p| *p == SHOTS_DIR) {
            Some(index) => (EntityType::Shot, index),
            None => (EntityType::Asset, parts.iter().position(|p| *p == ASSETS_DIR)?),
        };
        let [group, code, step] = parts.get(index + 1..index + 4)? else {
            return None;
        };
        Some(Location { entity_type, group: group.to_string(), code: code.to_string(), step: step.to_string() })
    }

    fn work_dir(&self, root: &Path, location: &Location, software: &str) -> PathBuf {
        let top = match location.entity_type {
            EntityType::Asset => ASSETS_DIR,
            _ => SHOTS_DIR,
        };
        root.join(top)
            .join(&location.group)
            .join(&location.code)
            .join(&location.step)
            .join(WORK_DIR)
            .join(software.to_lowercase())
    }

    fn publish_path(&self, work_path: &Path, name: Option<&str>) -> PathBuf {
        let directory = work_path.parent().unwrap_or_else(|| Path::new(""));
        let mut swapped = false;
        let publish_dir: PathBuf = directory
            .components()
            .map(|component| match component {
                Component::Normal(part) if !swapped && part == WORK_DIR => {
                    swapped = true;
                    Component::Normal(PUBLISH_DIR.as_ref())
                },
                other => other,
            })
            .collect();
        match name {
            Some(name) => publish_dir.join(name),
            None => publish_dir.join(work_path.file_name().unwrap_or_default()),
        }
    }
}
