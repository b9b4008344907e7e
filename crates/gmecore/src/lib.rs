//! Core engine of a generic file-overlay mod enabler.
//!
//! Mods live as plain directories under a mods root; enabling a mod overlays
//! its files onto a managed root, backing up whatever was there before.
//! Disabling restores exactly the pre-enable state from a per-mod install
//! log and backup store, and an ownership/dependency guard keeps overlapping
//! mods from destroying each other's content.
//!
//! The public surface is [`engine::ModEngine`]; everything else is the
//! plumbing underneath it.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod modinfo;
pub mod overlay;
pub mod paths;
pub mod scanner;

pub use engine::{CancelToken, DisableReport, EngineError, ModEngine};
pub use modinfo::ModEntry;
pub use overlay::{Layout, OverlayOp};
