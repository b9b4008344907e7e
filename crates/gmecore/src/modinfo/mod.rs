//! Catalog entries for mods discovered under the mods root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::state::{StateDoc, ORDER_DISABLED};
use crate::overlay::{self, Layout, OverlayOp};

/// One mod in the catalog: identity plus enablement/dependency status.
#[derive(Debug, Clone)]
pub struct ModEntry {
    /// Unique name, derived from the directory name.
    pub name: String,
    /// Full path of the mod's source directory.
    pub path: PathBuf,
    /// Rank among currently enabled mods; `-1` when disabled.
    pub applied_order: i64,
    /// Mods that must be disabled before this one may be disabled.
    pub depends_on: BTreeSet<String>,
}

impl ModEntry {
    /// Create an entry from a mod directory. Order and dependencies start
    /// out disabled/empty until [`hydrate`](Self::hydrate) is called.
    pub fn from_directory(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid mod directory name: {:?}", path))?
            .to_string();

        Ok(ModEntry {
            name,
            path: path.to_path_buf(),
            applied_order: ORDER_DISABLED,
            depends_on: BTreeSet::new(),
        })
    }

    /// Fill in applied order and dependency set from the state document.
    pub fn hydrate(&mut self, state: &StateDoc) {
        self.applied_order = state.order_of(&self.name);
        self.depends_on = state.depends_on(&self.name);
    }

    /// Whether the mod is currently applied to the managed root.
    pub fn enabled(&self) -> bool {
        self.applied_order != ORDER_DISABLED
    }

    /// Derive this mod's overlay operations from its directory contents.
    pub fn overlay_ops(&self, layout: &Layout) -> Result<Vec<OverlayOp>> {
        overlay::derive_ops(layout, &self.name)
    }
}
