//! Working tree status
//!
//! - `file_change`: per-path change kinds and their display
//! - `inspector`: single-path comparisons between HEAD, index and workspace
//! - `status_info`: the full status snapshot

pub mod file_change;
pub mod inspector;
pub mod status_info;
