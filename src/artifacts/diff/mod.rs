//! Tree and content comparison
//!
//! - `diff_target`: one side of a file diff (HEAD, index, workspace or nothing)
//! - `hunks`: line diffs grouped into unified hunks
//! - `tree_diff`: file-level changes between two trees

pub mod diff_target;
pub mod hunks;
pub mod tree_diff;
