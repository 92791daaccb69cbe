//! Data structures and algorithms
//!
//! The types and algorithms the stores are built from:
//!
//! - `branch`: Branch names and revision parsing
//! - `checkout`: Checkout operations and conflict detection
//! - `core`: Shared utilities (pager wrapper, lock files)
//! - `database`: Database entry types
//! - `diff`: Tree diffing and line hunks
//! - `index`: Index/staging area data structures
//! - `log`: Commit history traversal and filtering
//! - `objects`: Object types (blob, tree, commit, tag)
//! - `pack`: Pack encoding and the object walk that fills a pack
//! - `status`: Working tree status inspection
//! - `merge`: Merge algorithms and conflict resolution

pub mod branch;
pub mod checkout;
pub mod core;
pub mod database;
pub mod diff;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod pack;
pub mod status;
