//! Overlay operations: what enabling a mod will do to the managed root.
//!
//! A mod directory maps 1:1 to a sequence of [`OverlayOp`]s. Regular files
//! overwrite (or add) their destination; files whose name ends in
//! `-remove` mark the destination for deletion instead. Documentation
//! folders and mod-description files are never part of the payload.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::config::state::STATE_FILE;

/// Backup store directory under the mods root.
pub const BACKUP_DIR: &str = "!BACKUP";
/// Installation log directory under the mods root.
pub const LOG_DIR: &str = "!INSTLOGS";
/// File-name suffix marking a destination for deletion.
pub const DELETE_SUFFIX: &str = "-remove";
/// Folder excluded from a mod's payload (case-insensitive).
pub const DOCUMENTATION_DIR: &str = "documentation";
/// Mod-description extension excluded from the payload (case-insensitive).
pub const DESCRIPTION_EXT: &str = "jsgme";

/// The two directory trees an engine operates on, plus the reserved
/// locations derived from them.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Root containing one subdirectory per mod.
    pub mods_root: PathBuf,
    /// Root the overlays are applied to.
    pub managed_root: PathBuf,
}

impl Layout {
    pub fn new(mods_root: impl Into<PathBuf>, managed_root: impl Into<PathBuf>) -> Self {
        Layout {
            mods_root: mods_root.into(),
            managed_root: managed_root.into(),
        }
    }

    /// Path of the state document.
    pub fn state_file(&self) -> PathBuf {
        self.mods_root.join(STATE_FILE)
    }

    /// Root of the backup store.
    pub fn backup_root(&self) -> PathBuf {
        self.mods_root.join(BACKUP_DIR)
    }

    /// Root of the installation logs.
    pub fn log_root(&self) -> PathBuf {
        self.mods_root.join(LOG_DIR)
    }

    /// Source directory of a mod.
    pub fn mod_dir(&self, mod_name: &str) -> PathBuf {
        self.mods_root.join(mod_name)
    }

    /// Installation log path for a mod.
    pub fn log_path(&self, mod_name: &str) -> PathBuf {
        self.log_root().join(format!("{} install.log", mod_name))
    }

    /// Backup store entry for `(relative path, mod)`: the relative path
    /// under `!BACKUP/` with `.<ModName>` appended to the file name.
    pub fn backup_path(&self, relative: &Path, mod_name: &str) -> PathBuf {
        let mut path = self.backup_root().join(relative);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.set_file_name(format!("{}.{}", file_name, mod_name));
        path
    }
}

/// One file-level step of enabling a mod.
#[derive(Debug, Clone)]
pub struct OverlayOp {
    /// Payload file to place at `destination`; `None` means "delete the
    /// destination".
    pub source: Option<PathBuf>,
    /// Absolute target path under the managed root.
    pub destination: PathBuf,
    /// Where the previous destination content is parked during the overlay.
    pub backup_path: PathBuf,
    /// Destination path relative to the managed root.
    pub relative_path: PathBuf,
    /// Mod this operation belongs to.
    pub owner: String,
}

/// Derive the ordered overlay operations for a mod directory.
///
/// Pure with respect to engine state: the result depends only on the
/// directory contents at call time. Traversal order is deterministic
/// (lexicographic per directory level).
pub fn derive_ops(layout: &Layout, mod_name: &str) -> Result<Vec<OverlayOp>> {
    let mod_dir = layout.mod_dir(mod_name);
    let mut ops = Vec::new();

    for entry in WalkDir::new(&mod_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("walk mod directory {:?}", mod_dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&mod_dir)
            .context("relative payload path")?;
        if is_excluded(relative) {
            continue;
        }

        let (relative_path, source) = match strip_delete_suffix(relative) {
            Some(target) => (target, None),
            None => (relative.to_path_buf(), Some(entry.path().to_path_buf())),
        };

        ops.push(OverlayOp {
            source,
            destination: layout.managed_root.join(&relative_path),
            backup_path: layout.backup_path(&relative_path, mod_name),
            relative_path,
            owner: mod_name.to_string(),
        });
    }

    Ok(ops)
}

/// Place `source` at `dest`, preferring a hard link and falling back to a
/// full copy when linking is unsupported (cross-volume, FAT, ...).
///
/// Any existing file at `dest` is replaced; the caller is responsible for
/// backing it up first.
pub fn materialize(source: &Path, dest: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(dest) {
        if meta.file_type().is_dir() {
            anyhow::bail!("destination exists as directory: {:?}", dest);
        }
        fs::remove_file(dest).with_context(|| format!("remove existing file {:?}", dest))?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {:?}", parent))?;
    }
    if fs::hard_link(source, dest).is_err() {
        fs::copy(source, dest).with_context(|| format!("copy {:?} -> {:?}", source, dest))?;
    }
    Ok(())
}

fn is_excluded(relative: &Path) -> bool {
    let in_documentation = relative.components().any(|component| {
        component
            .as_os_str()
            .to_string_lossy()
            .eq_ignore_ascii_case(DOCUMENTATION_DIR)
    });
    if in_documentation {
        return true;
    }
    relative
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(DESCRIPTION_EXT))
        .unwrap_or(false)
}

fn strip_delete_suffix(relative: &Path) -> Option<PathBuf> {
    let file_name = relative.file_name()?.to_string_lossy();
    let stripped = file_name.strip_suffix(DELETE_SUFFIX)?;
    if stripped.is_empty() {
        return None;
    }
    Some(relative.with_file_name(stripped))
}
