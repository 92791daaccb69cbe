//! Merging histories
//!
//! - `bca_finder`: best common ancestor search over the commit graph
//! - `resolve`: per-path three-way resolution of file maps

use crate::artifacts::merge::resolve::MergeConflict;
use crate::artifacts::objects::object_id::ObjectId;

pub mod bca_finder;
pub mod resolve;

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Always record a merge commit, even when a fast-forward is possible
    pub no_ff: bool,
    pub message: Option<String>,
}

/// Result of a merge; conflicts are an outcome, not an error
///
/// A conflicted merge leaves the working tree, index and refs untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyUpToDate(ObjectId),
    FastForwarded(ObjectId),
    Merged(ObjectId),
    Conflicted(Vec<MergeConflict>),
}

impl MergeOutcome {
    pub fn conflicted_paths(&self) -> Vec<&std::path::Path> {
        match self {
            MergeOutcome::Conflicted(conflicts) => {
                conflicts.iter().map(|conflict| conflict.path.as_path()).collect()
            }
            _ => Vec::new(),
        }
    }
}
