use crate::areas::index::Index;
use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::object_id::ObjectId;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SwitchOptions {
    /// Create the branch first (`switch -c`)
    pub create: bool,
    /// Where a new branch starts; HEAD when absent
    pub start_point: Option<String>,
    /// Overwrite local changes in the paths being switched
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub previous: Head,
    pub head: Head,
    /// `None` when switching to a new branch on an unborn HEAD
    pub oid: Option<ObjectId>,
    pub created: bool,
}

impl SwitchOutcome {
    pub fn detached(&self) -> bool {
        matches!(self.head, Head::Detached(_))
    }
}

impl Repository {
    /// Move HEAD to a branch or commit, updating the working tree and index
    ///
    /// Targets naming a local branch attach HEAD to it; any other revision
    /// detaches HEAD.
    pub async fn switch(&self, target: &str, options: SwitchOptions) -> anyhow::Result<SwitchOutcome> {
        let _lock = self.lock().await?;
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let previous = self.refs().head()?;
        let current_oid = self.refs().read_head()?;

        let (new_head, target_oid) = if options.create {
            let branch = BranchName::try_parse(target)?;
            let start = match options.start_point.as_deref() {
                Some(start) => Some(self.resolve_commit(start)?),
                None => current_oid.clone(),
            };
            if self.refs().read_raw(&RefName::branch(&branch))?.is_some() {
                anyhow::bail!("a branch named '{branch}' already exists");
            }
            (Head::Branch(RefName::branch(&branch)), start)
        } else {
            let oid = self.resolve_commit(target)?;
            let branch_ref = BranchName::try_parse(target)
                .ok()
                .map(|branch| RefName::branch(&branch))
                .filter(|name| matches!(self.refs().read_raw(name), Ok(Some(_))));
            match branch_ref {
                Some(name) => (Head::Branch(name), Some(oid)),
                None => (Head::Detached(oid.clone()), Some(oid)),
            }
        };

        if let Some(target_oid) = &target_oid {
            self.migrate(&mut index, current_oid.as_ref(), target_oid, options.force)?;
            index.write_updates()?;
        }

        // the branch appears only once the working tree reached its commit
        if let (true, Head::Branch(name), Some(start)) = (options.create, &new_head, &target_oid) {
            self.refs().update(name, None, start)?;
        }
        match &new_head {
            Head::Branch(name) => self.refs().create_symbolic(&RefName::head(), name)?,
            Head::Detached(oid) => self.refs().detach_head(oid)?,
        }
        tracing::info!(target, "switched HEAD");

        Ok(SwitchOutcome {
            previous,
            head: new_head,
            oid: target_oid,
            created: options.create,
        })
    }

    /// Make the working tree and index match `target` without moving HEAD
    ///
    /// Only paths that differ between HEAD and `target` are touched.
    pub async fn checkout_tree(&self, target: &ObjectId, force: bool) -> anyhow::Result<()> {
        let _lock = self.lock().await?;
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let current = self.refs().read_head()?;
        self.migrate(&mut index, current.as_ref(), target, force)?;
        index.write_updates()
    }

    /// Apply the changes between two commits or trees to the working tree
    /// and the in-memory index; the caller writes the index
    pub(crate) fn migrate(
        &self,
        index: &mut Index,
        from: Option<&ObjectId>,
        to: &ObjectId,
        force: bool,
    ) -> anyhow::Result<()> {
        let mut tree_diff = TreeDiff::new(self.database());
        tree_diff.compare_oids(from, Some(to), Path::new(""))?;
        let changes = tree_diff.into_changes();
        tracing::debug!(changes = changes.len(), force, "migrating working tree");

        let mut migration = Migration::new(self.database(), self.workspace(), index, changes);
        migration.apply_changes(force)
    }
}
