//! Destination conflict detection between mods.
//!
//! Two mods conflict when they write the same destination path. The engine
//! never merges content; the later mod simply overlays the earlier one and
//! becomes a "blocks removal of" dependency of it, because its backup now
//! holds the earlier mod's live file.

use std::collections::HashSet;

use anyhow::Result;

use crate::modinfo::ModEntry;
use crate::overlay::{Layout, OverlayOp};
use crate::paths::lookup_key;

/// Find the overlay operations of currently enabled mods whose destinations
/// collide with `candidate`'s. Returns the *existing* operations, exposing
/// the owning mod via [`OverlayOp::owner`]; meaningful only while
/// `candidate` is not yet enabled.
pub fn conflicts(
    layout: &Layout,
    candidate: &ModEntry,
    enabled: &[ModEntry],
) -> Result<Vec<OverlayOp>> {
    let candidate_keys: HashSet<String> = candidate
        .overlay_ops(layout)?
        .iter()
        .map(|op| lookup_key(&op.relative_path))
        .collect();
    if candidate_keys.is_empty() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for other in enabled {
        if other.name == candidate.name {
            continue;
        }
        for op in other.overlay_ops(layout)? {
            if candidate_keys.contains(&lookup_key(&op.relative_path)) {
                found.push(op);
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn make_mod(layout: &Layout, name: &str, files: &[&str]) -> ModEntry {
        let dir = layout.mod_dir(name);
        for file in files {
            let path = dir.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, name).unwrap();
        }
        ModEntry::from_directory(&dir).unwrap()
    }

    #[test]
    fn test_no_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path().join("mods"), tmp.path().join("root"));
        let a = make_mod(&layout, "ModA", &["data/a.txt"]);
        let mut b = make_mod(&layout, "ModB", &["data/b.txt"]);
        b.applied_order = 1;

        let found = conflicts(&layout, &a, &[b]).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_conflict_reports_existing_owner() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path().join("mods"), tmp.path().join("root"));
        let candidate = make_mod(&layout, "ModB", &["data/x.txt", "data/b.txt"]);
        let mut enabled = make_mod(&layout, "ModA", &["data/x.txt"]);
        enabled.applied_order = 1;

        let found = conflicts(&layout, &candidate, &[enabled]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner, "ModA");
        assert_eq!(found[0].relative_path, Path::new("data/x.txt"));
    }

    #[test]
    fn test_conflict_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path().join("mods"), tmp.path().join("root"));
        let candidate = make_mod(&layout, "ModB", &["Data/X.txt"]);
        let mut enabled = make_mod(&layout, "ModA", &["data/x.txt"]);
        enabled.applied_order = 1;

        let found = conflicts(&layout, &candidate, &[enabled]).unwrap();
        assert_eq!(found.len(), 1);
    }
}
