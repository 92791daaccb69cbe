//! The stores of one repository
//!
//! - `database`: content-addressed objects under `.gitc/objects`
//! - `refs`: branches, tags, remote-tracking refs and HEAD, updated by compare-and-swap
//! - `index`: the staging area
//! - `workspace`: the working tree on disk
//! - `config`: repository and global settings
//! - `repository`: the handle tying them together, plus the repository lock

pub mod config;
pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
