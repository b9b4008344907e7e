//! Path normalization for destination lookups.
//!
//! Mods authored on case-insensitive filesystems routinely disagree on the
//! casing of shared paths (`Data/Sound` vs `data/sound`), and some ship
//! Windows-style backslashes. Collision detection therefore compares
//! normalized keys, never raw paths.

use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Normalize a relative path for lookups and comparisons
/// (NFC normalized, lowercase, forward slashes, trimmed).
pub fn normalize_for_lookup(path: &str) -> String {
    path.nfc()
        .collect::<String>()
        .to_lowercase()
        .replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

/// Lookup key for a relative `Path`.
pub fn lookup_key(path: &Path) -> String {
    normalize_for_lookup(&path.to_string_lossy())
}

/// Check if two relative paths address the same destination.
pub fn paths_equal(a: &str, b: &str) -> bool {
    normalize_for_lookup(a) == normalize_for_lookup(b)
}
