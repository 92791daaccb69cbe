use crate::areas::repository::Repository;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::diff::hunks::{Hunk, diff_hunks};
use crate::artifacts::diff::tree_diff::{DiffFilter, TreeDiff};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use std::path::{Path, PathBuf};

/// Which two snapshots to compare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSource {
    /// Unstaged changes
    WorkspaceVsIndex,
    /// Staged changes (`--cached`)
    IndexVsHead,
    Revisions { from: String, to: String },
}

/// A changed file with both sides loaded
#[derive(Debug, Clone)]
pub struct FilePatch {
    pub path: PathBuf,
    /// `A`, `D` or `M`
    pub status: char,
    pub old: DiffTarget,
    pub new: DiffTarget,
}

impl FilePatch {
    /// Line hunks; `None` for binary content
    pub fn hunks(&self) -> Option<Vec<Hunk>> {
        diff_hunks(&self.old.data, &self.new.data)
    }
}

impl Repository {
    /// Changed files, limited to `paths` (files or directories) when any are given
    pub async fn diff(
        &self,
        source: DiffSource,
        filter: DiffFilter,
        paths: &[PathBuf],
    ) -> anyhow::Result<Vec<FilePatch>> {
        let patches = match source {
            DiffSource::WorkspaceVsIndex => self.diff_workspace().await?,
            DiffSource::IndexVsHead => self.diff_index().await?,
            DiffSource::Revisions { from, to } => {
                let from = self.resolve_commit(&from)?;
                let to = self.resolve_commit(&to)?;
                self.diff_commits(Some(&from), &to)?
            }
        };

        Ok(patches
            .into_iter()
            .filter(|patch| Self::status_matches(patch.status, filter))
            .filter(|patch| paths.is_empty() || paths.iter().any(|path| patch.path.starts_with(path)))
            .collect())
    }

    fn status_matches(status: char, filter: DiffFilter) -> bool {
        match status {
            'A' => filter.contains(DiffFilter::ADDED),
            'D' => filter.contains(DiffFilter::DELETED),
            _ => filter.contains(DiffFilter::MODIFIED),
        }
    }

    async fn diff_workspace(&self) -> anyhow::Result<Vec<FilePatch>> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        let head = self.refs().read_head()?;
        let status = self.status_inspector().compute(&index, head.as_ref())?;

        let mut patches = Vec::new();
        for (path, change) in status.changed_files() {
            let (status, new) = match change.workspace_change {
                WorkspaceChangeType::Modified => ('M', DiffTarget::from_workspace(path, self.workspace())?),
                WorkspaceChangeType::Deleted => ('D', DiffTarget::from_nothing(path)),
                WorkspaceChangeType::None | WorkspaceChangeType::Untracked => continue,
            };
            let old = DiffTarget::from_index(path, &index, self.database())?;
            if !old.is_same_as(&new) {
                patches.push(FilePatch { path: path.clone(), status, old, new });
            }
        }

        Ok(patches)
    }

    async fn diff_index(&self) -> anyhow::Result<Vec<FilePatch>> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        let head = self.refs().read_head()?;
        let head_tree = match &head {
            Some(head) => Some(self.database().peel_to_tree(head)?),
            None => None,
        };
        let head_files = self.database().tree_files(head_tree.as_ref())?;
        let status = self.status_inspector().compute(&index, head.as_ref())?;

        let mut patches = Vec::new();
        for (path, change) in status.changed_files() {
            let status = match change.index_change {
                IndexChangeType::Added => 'A',
                IndexChangeType::Modified => 'M',
                IndexChangeType::Deleted => 'D',
                IndexChangeType::None => continue,
            };
            patches.push(FilePatch {
                path: path.clone(),
                status,
                old: DiffTarget::from_entry(path, head_files.get(path), self.database())?,
                new: DiffTarget::from_index(path, &index, self.database())?,
            });
        }

        Ok(patches)
    }

    /// File changes between two commits; `from` of `None` is the empty tree
    pub fn diff_commits(&self, from: Option<&ObjectId>, to: &ObjectId) -> anyhow::Result<Vec<FilePatch>> {
        let mut tree_diff = TreeDiff::new(self.database());
        tree_diff.compare_oids(from, Some(to), Path::new(""))?;

        tree_diff
            .into_changes()
            .into_iter()
            .map(|(path, change)| {
                Ok(FilePatch {
                    status: change.status_char(),
                    old: DiffTarget::from_entry(&path, change.old_entry(), self.database())?,
                    new: DiffTarget::from_entry(&path, change.new_entry(), self.database())?,
                    path,
                })
            })
            .collect()
    }
}
