//! Command implementations
//!
//! - `plumbing`: low-level object access (cat-file, hash-object, ls-tree)
//! - `porcelain`: user-facing workflows (add, commit, log, merge, fetch, push, ...)
//!
//! Both are `impl Repository` blocks returning data; the CLI renders it.

pub mod plumbing;
pub mod porcelain;
