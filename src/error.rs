//! Typed failures raised by the repository core
//!
//! Every operation returns `anyhow::Result`, the same way the rest of the crate
//! propagates errors. Failures that callers are expected to react to are raised
//! as a [`RepoError`] so they can be recovered with `downcast_ref`:
//!
//! ```rust,ignore
//! match repository.commit("msg", None).await {
//!     Err(e) if matches!(e.downcast_ref(), Some(RepoError::NothingToCommit)) => {}
//!     other => other?,
//! }
//! ```

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("object {oid} is corrupt: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error("ref {name} changed concurrently: expected {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("ref {0} kept moving while committing, giving up")]
    ConcurrentUpdate(String),

    #[error("local changes would be overwritten: {}", display_paths(.0))]
    DirtyWorkingTree(Vec<PathBuf>),

    #[error("nothing to commit, working tree clean")]
    NothingToCommit,

    #[error("{0} and {1} have no common ancestor")]
    Unrelated(ObjectId, ObjectId),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("cannot delete the checked-out branch {0}")]
    ProtectedRef(String),

    #[error("pathspec did not match any files: {}", display_paths(.0))]
    PathNotFound(Vec<PathBuf>),

    #[error("symbolic ref {0} nests too deeply")]
    SymbolicLoop(String),

    #[error("unknown ref {0}")]
    UnknownRef(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RepoError {
    pub fn corrupt(oid: impl ToString, reason: impl Into<String>) -> Self {
        RepoError::Corrupt {
            oid: oid.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        RepoError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Find a typed failure anywhere in an error chain
    pub fn find(error: &anyhow::Error) -> Option<&RepoError> {
        error.chain().find_map(|cause| cause.downcast_ref::<RepoError>())
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
