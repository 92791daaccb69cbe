use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::TreeBuilder;
use crate::artifacts::merge::resolve::FileMap;
use crate::error::RepoError;

/// HEAD is re-read and the commit rebuilt this many times when it moves
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub oid: ObjectId,
    /// `None` when HEAD is detached
    pub branch: Option<BranchName>,
    pub is_root: bool,
    pub short_message: String,
}

impl Repository {
    /// Record the index as a new commit on top of HEAD
    ///
    /// Fails with [`RepoError::NothingToCommit`] when the index matches HEAD's
    /// tree. When HEAD moves under us the commit is rebuilt on the new HEAD,
    /// and [`RepoError::ConcurrentUpdate`] is returned after
    /// `MAX_COMMIT_ATTEMPTS` lost races.
    pub async fn commit(&self, message: &str, author: Option<Author>) -> anyhow::Result<CommitSummary> {
        let message = message.trim();
        if message.is_empty() {
            anyhow::bail!("aborting commit due to empty commit message");
        }
        let author = match author {
            Some(author) => author,
            None => self.author()?,
        };

        let _lock = self.lock().await?;
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let files = index.database_entries();
        let tree_oid = self.write_tree(&files)?;

        let mut short_message = String::new();
        let (oid, parent) = self.update_head_with(|parent| {
            let unchanged = match parent {
                Some(parent) => self.database().peel_to_tree(parent)? == tree_oid,
                None => files.is_empty(),
            };
            if unchanged {
                return Err(RepoError::NothingToCommit.into());
            }

            let commit = Commit::new(
                parent.into_iter().cloned().collect(),
                tree_oid.clone(),
                author.clone(),
                message.to_string(),
            );
            short_message = commit.short_message();
            self.database().store_commit(&commit)
        })?;

        tracing::info!(commit = %oid.to_short_oid(), "created commit");
        Ok(CommitSummary {
            oid,
            branch: self.refs().current_branch()?,
            is_root: parent.is_none(),
            short_message,
        })
    }

    /// Build a commit on top of HEAD and move HEAD to it
    ///
    /// `build` gets the current HEAD (`None` on an unborn branch) and returns
    /// the id of the commit to move to. When HEAD moves before the update, the
    /// commit is built again on the new HEAD; after `MAX_COMMIT_ATTEMPTS`
    /// lost races the update fails with [`RepoError::ConcurrentUpdate`].
    /// Returns the new id and the parent it was built on. The caller holds
    /// the repository lock.
    pub fn update_head_with<F>(&self, mut build: F) -> anyhow::Result<(ObjectId, Option<ObjectId>)>
    where
        F: FnMut(Option<&ObjectId>) -> anyhow::Result<ObjectId>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let parent = self.refs().read_head()?;
            let oid = build(parent.as_ref())?;

            match self.refs().update(&RefName::head(), parent.as_ref(), &oid) {
                Ok(()) => return Ok((oid, parent)),
                Err(e) if matches!(RepoError::find(&e), Some(RepoError::Conflict { .. })) => {
                    tracing::debug!(attempt, "HEAD moved while committing, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepoError::ConcurrentUpdate(self.refs().follow(&RefName::head())?.0.to_string()).into())
    }

    /// Store the trees for a flat file map and return the root tree id
    pub(crate) fn write_tree(&self, files: &FileMap) -> anyhow::Result<ObjectId> {
        let builder = TreeBuilder::build(files.iter().map(|(path, entry)| (path, entry.clone())))?;
        let root = builder.write_with(&mut |tree| self.database().store(tree))?;
        self.database().store(&root)
    }
}
