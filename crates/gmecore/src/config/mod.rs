//! On-disk configuration formats.

pub mod ini;
pub mod state;
