//! gitc: a self-contained version-control client
//!
//! - `areas`: the stores of one repository (objects, refs, index, working tree, config)
//! - `artifacts`: data types and algorithms those stores are built from
//! - `commands`: plumbing and porcelain operations on a [`areas::repository::Repository`]
//! - `transport`: fetch and push over ssh or to a local path
//! - `cli`: argument parsing and rendering for the `gitc` binary

pub mod areas;
pub mod artifacts;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod transport;
