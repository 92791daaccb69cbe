//! Moving the working tree and index from one tree to another
//!
//! A [`Migration`] is planned in full before anything is touched: every path
//! the tree diff mentions is checked against the index and the working tree,
//! and a single conflicting path aborts the whole checkout with
//! [`RepoError::DirtyWorkingTree`].

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::checkout::conflict::ConflictType;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use crate::error::RepoError;
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionType {
    Add,
    Delete,
    Modify,
}

type Action = (PathBuf, Option<DatabaseEntry>);

pub struct Migration<'a> {
    database: &'a Database,
    workspace: &'a Workspace,
    index: &'a mut Index,
    inspector: Inspector<'a>,
    changes: ChangeSet,
    actions: BTreeMap<ActionType, Vec<Action>>,
    conflicts: BTreeMap<ConflictType, BTreeSet<PathBuf>>,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'a> Migration<'a> {
    pub fn new(
        database: &'a Database,
        workspace: &'a Workspace,
        index: &'a mut Index,
        changes: ChangeSet,
    ) -> Self {
        Self {
            database,
            workspace,
            index,
            inspector: Inspector::new(workspace),
            changes,
            actions: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    pub fn actions_of(&self, action_type: ActionType) -> &[Action] {
        self.actions
            .get(&action_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    /// Plan, check, then rewrite the working tree and index
    ///
    /// With `force` local changes are overwritten instead of reported. The
    /// index is updated in memory only; persisting it is up to the caller.
    pub fn apply_changes(&mut self, force: bool) -> anyhow::Result<()> {
        self.plan_changes(force)?;
        self.workspace.apply_migration(self)?;
        self.update_index()?;

        tracing::debug!(
            added = self.actions_of(ActionType::Add).len(),
            modified = self.actions_of(ActionType::Modify).len(),
            deleted = self.actions_of(ActionType::Delete).len(),
            "applied checkout"
        );
        Ok(())
    }

    fn plan_changes(&mut self, force: bool) -> anyhow::Result<()> {
        let changes = std::mem::take(&mut self.changes);

        for (path, change) in &changes {
            if !force {
                self.check_for_conflict(path, change)?;
            }
            self.record_change(path, change);
        }
        self.changes = changes;

        if self.conflicts.is_empty() {
            return Ok(());
        }

        for (conflict_type, paths) in &self.conflicts {
            for path in paths {
                tracing::info!(path = %path.display(), "{}", conflict_type.describe());
            }
        }
        let paths = self
            .conflicts
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Err(RepoError::DirtyWorkingTree(paths).into())
    }

    fn add_conflict(&mut self, conflict_type: ConflictType, path: &Path) {
        self.conflicts
            .entry(conflict_type)
            .or_default()
            .insert(path.to_path_buf());
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path).cloned();
        let entry = entry.as_ref();
        let (old_entry, new_entry) = (change.old_entry(), change.new_entry());

        if self.index_differs_from_trees(entry, old_entry, new_entry) {
            self.add_conflict(ConflictType::StaleFile, path);
            return Ok(());
        }

        let stat = self.workspace.stat_file(path)?;
        let conflict_type = ConflictType::classify(stat.as_ref(), entry, new_entry);

        match &stat {
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.has_untracked(path, self.index)? {
                    self.add_conflict(conflict_type, path);
                }
            }
            Some(stat) => {
                if self.inspector.check_index_against_workspace(entry, Some(stat))?
                    != WorkspaceChangeType::None
                {
                    self.add_conflict(conflict_type, path);
                }
            }
            None if new_entry.is_some() => {
                if let Some(parent) = self.untracked_parent(path)? {
                    self.add_conflict(ConflictType::UntrackedOverwritten, &parent);
                }
            }
            None => {}
        }

        Ok(())
    }

    /// An untracked file occupying one of the directories `path` needs
    fn untracked_parent(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        for ancestor in parent.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            if let Some(stat) = self.workspace.stat_file(ancestor)?
                && !stat.mode.is_tree()
                && !self.index.is_directly_tracked(ancestor)
            {
                return Ok(Some(ancestor.to_path_buf()));
            }
        }

        Ok(None)
    }

    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector
            .check_index_against_head_tree(index_entry, old_entry)
            != IndexChangeType::None
            && self
                .inspector
                .check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .parent()
            .into_iter()
            .flat_map(Path::ancestors)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let (action_type, entry) = match change {
            TreeChangeType::Added(new) => {
                self.mkdirs.extend(parents);
                (ActionType::Add, Some(new.clone()))
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(parents);
                (ActionType::Modify, Some(new.clone()))
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                (ActionType::Delete, None)
            }
        };

        self.actions
            .entry(action_type)
            .or_default()
            .push((path.to_path_buf(), entry));
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        for (path, _) in self.actions.get(&ActionType::Delete).into_iter().flatten() {
            self.index.remove(path);
        }

        for action_type in [ActionType::Add, ActionType::Modify] {
            for (path, entry) in self.actions.get(&action_type).into_iter().flatten() {
                let entry = entry
                    .as_ref()
                    .with_context(|| format!("no target entry for {}", path.display()))?;
                let stat = self
                    .workspace
                    .stat_file(path)?
                    .with_context(|| format!("{} vanished during checkout", path.display()))?;

                self.index
                    .add(IndexEntry::new(path.clone(), entry.oid.clone(), stat));
            }
        }

        Ok(())
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        Ok(self.database.parse_object_as_blob(object_id)?.into_content())
    }
}
