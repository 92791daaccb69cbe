use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{
    FileChange, IndexChangeType, StatusCategory, WorkspaceChangeType,
};
use crate::artifacts::status::inspector::Inspector;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub type HeadTree = BTreeMap<PathBuf, DatabaseEntry>;

/// Snapshot of how HEAD, the index and the working tree differ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusInfo {
    changed_files: BTreeMap<PathBuf, FileChange>,
    untracked_files: BTreeSet<PathBuf>,
}

impl StatusInfo {
    pub fn is_clean(&self) -> bool {
        self.changed_files.is_empty() && self.untracked_files.is_empty()
    }

    /// Nothing staged or modified; untracked files do not count
    pub fn is_tracked_clean(&self) -> bool {
        self.changed_files.is_empty()
    }

    pub fn changed_files(&self) -> &BTreeMap<PathBuf, FileChange> {
        &self.changed_files
    }

    pub fn untracked_files(&self) -> &BTreeSet<PathBuf> {
        &self.untracked_files
    }

    pub fn change_of(&self, path: &Path) -> Option<&FileChange> {
        self.changed_files.get(path)
    }

    /// Every path in `category`, sorted
    pub fn paths_in(&self, category: StatusCategory) -> Vec<&Path> {
        if category == StatusCategory::Untracked {
            return self.untracked_files.iter().map(PathBuf::as_path).collect();
        }

        self.changed_files
            .iter()
            .filter(|(_, change)| change.categories().contains(&category))
            .map(|(path, _)| path.as_path())
            .collect()
    }

    /// `(code, path)` pairs in path order, untracked files last
    pub fn porcelain(&self) -> Vec<(String, &Path)> {
        self.changed_files
            .iter()
            .map(|(path, change)| (change.to_string(), path.as_path()))
            .chain(
                self.untracked_files
                    .iter()
                    .map(|path| ("??".to_string(), path.as_path())),
            )
            .collect()
    }
}

/// Computes a [`StatusInfo`] without writing anything
#[derive(new)]
pub struct Status<'a> {
    database: &'a Database,
    workspace: &'a Workspace,
}

impl<'a> Status<'a> {
    pub fn compute(&self, index: &Index, head: Option<&ObjectId>) -> anyhow::Result<StatusInfo> {
        let inspector = Inspector::new(self.workspace);
        let head_tree = self.load_head_tree(head)?;
        let mut changed_files = BTreeMap::<PathBuf, FileChange>::new();

        for entry in index.entries() {
            let stat = self.workspace.stat_file(&entry.name)?;
            let change = FileChange {
                index_change: inspector
                    .check_index_against_head_tree(Some(entry), head_tree.get(&entry.name)),
                workspace_change: inspector
                    .check_index_against_workspace(Some(entry), stat.as_ref())?,
            };

            if change != FileChange::default() {
                changed_files.insert(entry.name.clone(), change);
            }
        }

        for path in head_tree.keys() {
            if index.entry_by_path(path).is_none() {
                changed_files.entry(path.clone()).or_default().index_change =
                    IndexChangeType::Deleted;
            }
        }

        let untracked_files = self
            .workspace
            .list_files(None)?
            .into_iter()
            .filter(|path| index.entry_by_path(path).is_none())
            .collect::<BTreeSet<_>>();

        tracing::debug!(
            changed = changed_files.len(),
            untracked = untracked_files.len(),
            "computed status"
        );
        debug_assert!(
            changed_files
                .values()
                .all(|change| change.workspace_change != WorkspaceChangeType::Untracked)
        );

        Ok(StatusInfo {
            changed_files,
            untracked_files,
        })
    }

    fn load_head_tree(&self, head: Option<&ObjectId>) -> anyhow::Result<HeadTree> {
        let tree_oid = head
            .map(|head| self.database.peel_to_tree(head))
            .transpose()?;
        self.database.tree_files(tree_oid.as_ref())
    }
}
