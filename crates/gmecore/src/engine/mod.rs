//! The overlay engine: enable/disable transitions and the operations
//! around them.
//!
//! One engine instance per managed root. A single internal gate serializes
//! every mutating operation (enable, disable, rescan, rename, delete), so
//! state bookkeeping is never observed half-applied. Two engine instances
//! pointed at the same mods root are unsupported; single-instance operation
//! is the caller's responsibility.

pub mod journal;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::state::StateDoc;
use crate::conflict;
use crate::modinfo::ModEntry;
use crate::overlay::{self, Layout, OverlayOp};
use crate::scanner::{self, MARKER_CHAR};

/// Invariant violations, phrased as complete sentences for direct display.
/// Always raised before any filesystem mutation of the failing operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Mod \"{0}\" is already enabled.")]
    AlreadyEnabled(String),
    #[error("Mod \"{0}\" is already disabled.")]
    NotEnabled(String),
    #[error("Mod \"{name}\" cannot be disabled yet: {} must be removed first.", dependents.join(", "))]
    Blocked {
        name: String,
        dependents: Vec<String>,
    },
    #[error("Mod \"{0}\" must be disabled first.")]
    MustDisableFirst(String),
    #[error("A mod named \"{0}\" already exists.")]
    NameTaken(String),
    #[error("Mod \"{0}\" was not found.")]
    NotFound(String),
}

/// Cancellation signal for a long-running operation, checked at file
/// granularity: a single large copy is never interrupted mid-write.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a disable pass. The operation itself is best-effort; a
/// non-zero `failed` count means some destinations could not be removed or
/// restored and were left as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisableReport {
    /// Logged paths fully undone.
    pub restored: usize,
    /// Logged paths that hit an I/O error.
    pub failed: usize,
}

impl DisableReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// No-op progress sink for callers that don't track progress.
pub fn no_progress(_label: &str, _fraction: Option<f64>) {}

/// The mod enabler for one `(mods root, managed root)` pair.
pub struct ModEngine {
    layout: Layout,
    /// Catalog plus the single-operation gate guarding it.
    catalog: Mutex<Vec<ModEntry>>,
}

impl ModEngine {
    /// Create an engine and perform the initial catalog scan.
    pub fn new(mods_root: impl Into<PathBuf>, managed_root: impl Into<PathBuf>) -> Result<Self> {
        let layout = Layout::new(mods_root, managed_root);
        let entries = scanner::scan_mods(&layout)?;
        Ok(ModEngine {
            layout,
            catalog: Mutex::new(entries),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Rebuild the catalog from disk.
    pub fn scan(&self) -> Result<()> {
        let mut catalog = self.gate();
        *catalog = scanner::scan_mods(&self.layout)?;
        Ok(())
    }

    /// Snapshot of the current catalog, sorted by name.
    pub fn list(&self) -> Vec<ModEntry> {
        self.gate().clone()
    }

    /// Overlay operations of enabled mods colliding with `name`'s
    /// destinations. Only meaningful while `name` is disabled.
    pub fn conflicts(&self, name: &str) -> Result<Vec<OverlayOp>> {
        let catalog = self.gate();
        let candidate = find(&catalog, name)?.clone();
        let enabled = enabled_in_order(&catalog);
        conflict::conflicts(&self.layout, &candidate, &enabled)
    }

    /// Enable a mod: fix ownership/dependency bookkeeping in the state
    /// document, then overlay the mod's files onto the managed root,
    /// backing up whatever they replace.
    ///
    /// Per-file I/O failures are logged and skipped; cancellation stops
    /// between files, leaving a partially enabled mod that is always
    /// safely disable-able.
    pub fn enable(
        &self,
        name: &str,
        progress: impl Fn(&str, Option<f64>),
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut catalog = self.gate();
        let entry = find(&catalog, name)?.clone();
        if entry.enabled() {
            return Err(EngineError::AlreadyEnabled(name.to_string()).into());
        }

        // Bookkeeping first: order slot and dependency edges are persisted
        // before any file is touched, so an interrupted file pass can never
        // leave the ownership decision in doubt.
        let enabled = enabled_in_order(&catalog);
        let mut state = StateDoc::load(&self.layout.state_file())?;
        state.insert_last(name);
        let collisions = conflict::conflicts(&self.layout, &entry, &enabled)?;
        let owners: BTreeSet<&str> = collisions.iter().map(|op| op.owner.as_str()).collect();
        for owner in owners {
            state.add_dependency(owner, name);
        }
        state.normalize();
        fs::create_dir_all(&self.layout.mods_root).context("create mods root")?;
        state.save(&self.layout.state_file())?;

        // A stale log means a previous disable never finished cleaning up;
        // treat the mod as still enabled rather than overlay on top of it.
        if journal::log_exists(&self.layout, name) {
            *catalog = scanner::scan_mods(&self.layout)?;
            return Err(EngineError::AlreadyEnabled(name.to_string()).into());
        }

        let ops = entry.overlay_ops(&self.layout)?;
        let mut log = journal::InstallLog::create(&self.layout, name)?;
        let total = ops.len();
        for (index, op) in ops.iter().enumerate() {
            // Fraction of files processed so far, reported before this one.
            progress(
                &op.relative_path.display().to_string(),
                Some(index as f64 / total as f64),
            );
            if cancel.is_cancelled() {
                tracing::debug!("enable of {} cancelled after {} files", name, index);
                break;
            }
            if let Err(e) = apply_op(op, &mut log) {
                tracing::warn!("failed to overlay {:?}: {:#}", op.relative_path, e);
            }
        }

        *catalog = scanner::scan_mods(&self.layout)?;
        Ok(())
    }

    /// Disable a mod: undo exactly what its installation log records, in
    /// order, restoring backed-up content. The log is deleted up front —
    /// from that point the mod counts as disabled even if restoration is
    /// interrupted, trading possibly incomplete restoration for never
    /// getting stuck unable to re-enable.
    pub fn disable(
        &self,
        name: &str,
        progress: impl Fn(&str, Option<f64>),
        cancel: &CancelToken,
    ) -> Result<DisableReport> {
        let mut catalog = self.gate();
        let entry = find(&catalog, name)?.clone();
        if !entry.enabled() {
            return Err(EngineError::NotEnabled(name.to_string()).into());
        }
        if !entry.depends_on.is_empty() {
            return Err(EngineError::Blocked {
                name: name.to_string(),
                dependents: entry.depends_on.iter().cloned().collect(),
            }
            .into());
        }

        let mut state = StateDoc::load(&self.layout.state_file())?;
        state.remove(name);
        state.normalize();
        state.save(&self.layout.state_file())?;

        let logged = journal::read_log(&self.layout, name)?;
        if journal::log_exists(&self.layout, name) {
            journal::delete_log(&self.layout, name)?;
        }

        let mut report = DisableReport::default();
        let total = logged.len();
        for (index, relative) in logged.iter().enumerate() {
            progress(
                &relative.display().to_string(),
                Some(index as f64 / total as f64),
            );
            if cancel.is_cancelled() {
                tracing::debug!("disable of {} cancelled after {} files", name, index);
                break;
            }
            match self.restore_path(relative, name) {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    tracing::warn!("failed to restore {:?}: {:#}", relative, e);
                    report.failed += 1;
                }
            }
        }

        *catalog = scanner::scan_mods(&self.layout)?;
        Ok(report)
    }

    /// Rename a disabled mod's source directory.
    pub fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let mut catalog = self.gate();
        let entry = find(&catalog, name)?.clone();
        if entry.enabled() {
            return Err(EngineError::MustDisableFirst(name.to_string()).into());
        }
        if new_name.is_empty()
            || new_name.starts_with(MARKER_CHAR)
            || new_name.contains(['/', '\\'])
        {
            anyhow::bail!("invalid mod name: {:?}", new_name);
        }
        let new_dir = self.layout.mod_dir(new_name);
        if new_dir.exists() {
            return Err(EngineError::NameTaken(new_name.to_string()).into());
        }
        fs::rename(&entry.path, &new_dir)
            .with_context(|| format!("rename mod {:?} -> {:?}", entry.path, new_dir))?;

        *catalog = scanner::scan_mods(&self.layout)?;
        Ok(())
    }

    /// Delete a disabled mod's source directory. A disabled mod owns no
    /// live destinations, so no overlay state is touched.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut catalog = self.gate();
        let entry = find(&catalog, name)?.clone();
        if entry.enabled() {
            return Err(EngineError::MustDisableFirst(name.to_string()).into());
        }
        fs::remove_dir_all(&entry.path)
            .with_context(|| format!("delete mod directory {:?}", entry.path))?;

        *catalog = scanner::scan_mods(&self.layout)?;
        Ok(())
    }

    fn restore_path(&self, relative: &Path, mod_name: &str) -> Result<()> {
        let destination = self.layout.managed_root.join(relative);
        if fs::symlink_metadata(&destination).is_ok() {
            fs::remove_file(&destination)
                .with_context(|| format!("remove {:?}", destination))?;
            if let Some(parent) = destination.parent() {
                journal::prune_empty_dirs(parent, &self.layout.managed_root);
            }
        }
        journal::restore_backup(&self.layout, relative, mod_name, &destination)?;
        Ok(())
    }

    fn gate(&self) -> MutexGuard<'_, Vec<ModEntry>> {
        // A panicked holder cannot leave the catalog logically torn; recover
        // the guard instead of poisoning every later operation.
        self.catalog.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn find<'a>(catalog: &'a [ModEntry], name: &str) -> Result<&'a ModEntry> {
    catalog
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| EngineError::NotFound(name.to_string()).into())
}

fn enabled_in_order(catalog: &[ModEntry]) -> Vec<ModEntry> {
    let mut enabled: Vec<ModEntry> = catalog.iter().filter(|e| e.enabled()).cloned().collect();
    enabled.sort_by_key(|e| e.applied_order);
    enabled
}

fn apply_op(op: &OverlayOp, log: &mut journal::InstallLog) -> Result<()> {
    if fs::symlink_metadata(&op.destination).is_ok() {
        journal::move_to_backup(&op.destination, &op.backup_path)?;
    }
    // The destination is committed from here on: log it before
    // materializing, so a failed overlay still leaves a restorable log
    // entry instead of stranding the backup.
    log.append(&op.relative_path)?;
    if let Some(source) = &op.source {
        overlay::materialize(source, &op.destination)?;
    }
    Ok(())
}
