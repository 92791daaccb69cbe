//! Switching the working tree between trees
//!
//! - `conflict`: classification of paths a checkout refuses to touch
//! - `migration`: planning and applying a checkout

pub mod conflict;
pub mod migration;
