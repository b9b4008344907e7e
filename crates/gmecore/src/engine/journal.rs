//! Installation logs and the backup store.
//!
//! The install log is the sole source of truth for what a disable pass must
//! undo: an ordered, append-only list of the relative paths an enable run
//! actually touched. Backups are parked per `(relative path, mod)` so two
//! mods overlaying the same destination never clobber each other's saved
//! content.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::overlay::Layout;

/// An open installation log, appended to as files are overlaid.
pub struct InstallLog {
    file: fs::File,
    path: PathBuf,
}

impl InstallLog {
    /// Open a fresh log for a mod. Fails if the parent directory cannot be
    /// created; truncates any stale log.
    pub fn create(layout: &Layout, mod_name: &str) -> Result<Self> {
        let path = layout.log_path(mod_name);
        fs::create_dir_all(layout.log_root()).context("create install log directory")?;
        let file = fs::File::create(&path)
            .with_context(|| format!("create install log {:?}", path))?;
        Ok(InstallLog { file, path })
    }

    /// Record one touched relative path. Flushed per line so a crash keeps
    /// every completed entry.
    pub fn append(&mut self, relative: &Path) -> Result<()> {
        writeln!(self.file, "{}", relative.display())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("append to install log {:?}", self.path))
    }
}

/// Whether an installation log exists for a mod.
pub fn log_exists(layout: &Layout, mod_name: &str) -> bool {
    layout.log_path(mod_name).exists()
}

/// Read the logged relative paths, in the order they were written.
/// A missing log reads as empty.
pub fn read_log(layout: &Layout, mod_name: &str) -> Result<Vec<PathBuf>> {
    let path = layout.log_path(mod_name);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("read install log {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Delete a mod's installation log.
pub fn delete_log(layout: &Layout, mod_name: &str) -> Result<()> {
    let path = layout.log_path(mod_name);
    fs::remove_file(&path).with_context(|| format!("delete install log {:?}", path))
}

/// Park the current destination content in the backup store.
pub fn move_to_backup(destination: &Path, backup_path: &Path) -> Result<()> {
    if let Some(parent) = backup_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create backup directory {:?}", parent))?;
    }
    move_file(destination, backup_path)
        .with_context(|| format!("back up {:?} -> {:?}", destination, backup_path))
}

/// Move a backup back to its destination, pruning emptied backup
/// directories afterwards. Returns `false` when no backup exists, which
/// means the destination was absent at overlay time.
pub fn restore_backup(
    layout: &Layout,
    relative: &Path,
    mod_name: &str,
    destination: &Path,
) -> Result<bool> {
    let backup_path = layout.backup_path(relative, mod_name);
    if !backup_path.exists() {
        return Ok(false);
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {:?}", parent))?;
    }
    move_file(&backup_path, destination)
        .with_context(|| format!("restore {:?} -> {:?}", backup_path, destination))?;
    if let Some(parent) = backup_path.parent() {
        prune_empty_dirs(parent, &layout.backup_root());
    }
    Ok(true)
}

/// Remove empty directories from `start` up to, but not including, `stop`.
/// Stops silently at the first non-empty directory.
pub fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current != *stop && current.starts_with(stop) {
        // remove_dir refuses non-empty directories, which ends the climb.
        if fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Rename, falling back to copy+delete across volumes.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(tmp: &Path) -> Layout {
        let layout = Layout::new(tmp.join("mods"), tmp.join("root"));
        std::fs::create_dir_all(&layout.mods_root).unwrap();
        std::fs::create_dir_all(&layout.managed_root).unwrap();
        layout
    }

    #[test]
    fn test_log_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());

        assert!(!log_exists(&layout, "ModA"));
        let mut log = InstallLog::create(&layout, "ModA").unwrap();
        log.append(Path::new("data/x.txt")).unwrap();
        log.append(Path::new("data/y.txt")).unwrap();
        drop(log);

        assert!(log_exists(&layout, "ModA"));
        let paths = read_log(&layout, "ModA").unwrap();
        assert_eq!(paths, vec![PathBuf::from("data/x.txt"), PathBuf::from("data/y.txt")]);

        delete_log(&layout, "ModA").unwrap();
        assert!(!log_exists(&layout, "ModA"));
        assert!(read_log(&layout, "ModA").unwrap().is_empty());
    }

    #[test]
    fn test_backup_and_restore() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let relative = Path::new("data/x.txt");
        let destination = layout.managed_root.join(relative);
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, "original").unwrap();

        let backup_path = layout.backup_path(relative, "ModB");
        move_to_backup(&destination, &backup_path).unwrap();
        assert!(!destination.exists());
        assert_eq!(std::fs::read_to_string(&backup_path).unwrap(), "original");

        let restored = restore_backup(&layout, relative, "ModB", &destination).unwrap();
        assert!(restored);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "original");
        assert!(!backup_path.exists());
        // Emptied backup subdirectories are pruned, the store root survives.
        assert!(!layout.backup_root().join("data").exists());
    }

    #[test]
    fn test_restore_without_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = layout(tmp.path());
        let destination = layout.managed_root.join("data/x.txt");

        let restored = restore_backup(&layout, Path::new("data/x.txt"), "ModB", &destination)
            .unwrap();
        assert!(!restored);
    }

    #[test]
    fn test_prune_stops_at_non_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let deep = root.join("a/b/c");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(root.join("a/keep.txt"), "").unwrap();

        prune_empty_dirs(&deep, &root);
        assert!(!root.join("a/b").exists());
        assert!(root.join("a").exists());
        assert!(root.exists());
    }
}
