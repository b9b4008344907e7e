//! The State Document: which mods are applied, in what order, and which
//! mods block the removal of which.
//!
//! Two tables live in `JSGME.ini` at the mods root:
//! - `[MODS]`: `ModName=<applied order>`
//! - `[DEPENDENCIES]`: `ModName="Blocker1","Blocker2"` — the listed mods
//!   must be disabled before `ModName` may be disabled.
//!
//! Both tables are always persisted in a single write so neither can be
//! observed updated without the other.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ini::{decode_name_list, encode_name_list, IniFile};

/// File name of the state document, relative to the mods root.
pub const STATE_FILE: &str = "JSGME.ini";

/// Applied order of a disabled mod.
pub const ORDER_DISABLED: i64 = -1;

/// Sentinel order for a freshly inserted mod; `normalize` renumbers it to
/// the end of the dense sequence.
const ORDER_LAST: i64 = i64::MAX;

const MODS_SECTION: &str = "MODS";
const DEPENDENCIES_SECTION: &str = "DEPENDENCIES";

/// In-memory view of the two state tables.
#[derive(Debug, Clone, Default)]
pub struct StateDoc {
    /// Applied order per enabled mod (dense 1..N after `normalize`).
    pub order: BTreeMap<String, i64>,
    /// Per mod, the set of mods that must be disabled before it.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl StateDoc {
    /// Load the state document. A missing file is an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(StateDoc::default());
        }
        let ini = IniFile::read(path)
            .with_context(|| format!("read state document {:?}", path))?;

        let mut order = BTreeMap::new();
        for (name, value) in ini.section_pairs(MODS_SECTION) {
            match value.trim().parse::<i64>() {
                Ok(rank) => {
                    order.insert(name, rank);
                }
                Err(_) => {
                    tracing::warn!("ignoring non-numeric order entry {}={}", name, value);
                }
            }
        }

        let mut dependencies = BTreeMap::new();
        for (name, value) in ini.section_pairs(DEPENDENCIES_SECTION) {
            let blockers = decode_name_list(&value);
            if !blockers.is_empty() {
                dependencies.insert(name, blockers);
            }
        }

        Ok(StateDoc {
            order,
            dependencies,
        })
    }

    /// Persist both tables, preserving any foreign sections in the file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ini = if path.exists() {
            IniFile::read(path)
                .with_context(|| format!("read state document {:?}", path))?
        } else {
            IniFile::default()
        };

        // [MODS] sorted by applied order so the file reads top to bottom.
        let mut ranked: Vec<(&String, &i64)> = self.order.iter().collect();
        ranked.sort_by_key(|(name, rank)| (**rank, (*name).clone()));
        let order_pairs: Vec<(String, String)> = ranked
            .into_iter()
            .map(|(name, rank)| (name.clone(), rank.to_string()))
            .collect();
        ini.replace_section(MODS_SECTION, &order_pairs);

        let dep_pairs: Vec<(String, String)> = self
            .dependencies
            .iter()
            .filter(|(_, blockers)| !blockers.is_empty())
            .map(|(name, blockers)| (name.clone(), encode_name_list(blockers)))
            .collect();
        ini.replace_section(DEPENDENCIES_SECTION, &dep_pairs);

        ini.write(path)
            .with_context(|| format!("write state document {:?}", path))
    }

    /// Applied order of a mod, [`ORDER_DISABLED`] when absent.
    pub fn order_of(&self, name: &str) -> i64 {
        self.order.get(name).copied().unwrap_or(ORDER_DISABLED)
    }

    /// Mods that must be disabled before `name` may be disabled.
    pub fn depends_on(&self, name: &str) -> BTreeSet<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// Insert a mod at the end of the order (sentinel value; call
    /// `normalize` before persisting).
    pub fn insert_last(&mut self, name: &str) {
        self.order.insert(name.to_string(), ORDER_LAST);
    }

    /// Record that `blocker` must be disabled before `name`.
    pub fn add_dependency(&mut self, name: &str, blocker: &str) {
        self.dependencies
            .entry(name.to_string())
            .or_default()
            .insert(blocker.to_string());
    }

    /// Remove a mod from the order table and strip it from every
    /// dependency set.
    pub fn remove(&mut self, name: &str) {
        self.order.remove(name);
        self.dependencies.remove(name);
        for blockers in self.dependencies.values_mut() {
            blockers.remove(name);
        }
        self.dependencies.retain(|_, blockers| !blockers.is_empty());
    }

    /// Renumber the order table to a dense 1..N sequence, keeping the
    /// relative order of current values. A fresh `insert_last` sentinel
    /// therefore lands at position N.
    pub fn normalize(&mut self) {
        let mut ranked: Vec<(String, i64)> =
            self.order.iter().map(|(n, r)| (n.clone(), *r)).collect();
        ranked.sort_by_key(|(name, rank)| (*rank, name.clone()));
        for (index, (name, _)) in ranked.into_iter().enumerate() {
            self.order.insert(name, index as i64 + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = StateDoc::load(&tmp.path().join(STATE_FILE)).unwrap();
        assert!(doc.order.is_empty());
        assert!(doc.dependencies.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_FILE);

        let mut doc = StateDoc::default();
        doc.insert_last("ModA");
        doc.normalize();
        doc.insert_last("ModB");
        doc.normalize();
        doc.add_dependency("ModA", "ModB");
        doc.save(&path).unwrap();

        let loaded = StateDoc::load(&path).unwrap();
        assert_eq!(loaded.order_of("ModA"), 1);
        assert_eq!(loaded.order_of("ModB"), 2);
        assert_eq!(loaded.order_of("ModC"), ORDER_DISABLED);
        assert!(loaded.depends_on("ModA").contains("ModB"));
        assert!(loaded.depends_on("ModB").is_empty());
    }

    #[test]
    fn test_normalize_appends_without_reordering() {
        let mut doc = StateDoc::default();
        // Simulate a hand-edited sparse table.
        doc.order.insert("First".to_string(), 3);
        doc.order.insert("Second".to_string(), 7);
        doc.insert_last("Third");
        doc.normalize();
        assert_eq!(doc.order_of("First"), 1);
        assert_eq!(doc.order_of("Second"), 2);
        assert_eq!(doc.order_of("Third"), 3);
    }

    #[test]
    fn test_remove_strips_dependency_sets() {
        let mut doc = StateDoc::default();
        doc.insert_last("ModA");
        doc.normalize();
        doc.insert_last("ModB");
        doc.normalize();
        doc.add_dependency("ModA", "ModB");

        doc.remove("ModB");
        assert_eq!(doc.order_of("ModB"), ORDER_DISABLED);
        assert!(doc.depends_on("ModA").is_empty());
        // Emptied sets are pruned, not persisted as blank entries.
        assert!(!doc.dependencies.contains_key("ModA"));
    }

    #[test]
    fn test_save_preserves_foreign_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_FILE);
        std::fs::write(&path, "[SETTINGS]\r\ntheme=dark\r\n").unwrap();

        let mut doc = StateDoc::default();
        doc.insert_last("ModA");
        doc.normalize();
        doc.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("[SETTINGS]"));
        assert!(raw.contains("theme=dark"));
        assert!(raw.contains("ModA=1"));
    }

    #[test]
    fn test_mods_section_written_in_rank_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_FILE);

        let mut doc = StateDoc::default();
        doc.insert_last("Zed");
        doc.normalize();
        doc.insert_last("Alpha");
        doc.normalize();
        doc.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let zed = raw.find("Zed=1").unwrap();
        let alpha = raw.find("Alpha=2").unwrap();
        assert!(zed < alpha);
    }
}
