use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::error::RepoError;
use anyhow::Context;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// What a staging call changed in the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub staged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl Repository {
    /// Stage files or directories (repository-relative; `.` for everything)
    ///
    /// Tracked files that vanished from the working tree are unstaged. Paths
    /// matching nothing are collected; everything else is still staged and
    /// written before [`RepoError::PathNotFound`] reports them all.
    pub async fn stage(&self, paths: &[PathBuf]) -> anyhow::Result<StageSummary> {
        let _lock = self.lock().await?;
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let mut summary = StageSummary::default();
        let mut missing = Vec::new();

        for path in paths {
            let root = Self::stage_root(path);
            let files = match root {
                Some(root) if !self.workspace().exists(root) => Vec::new(),
                root => self.workspace().list_files(root)?,
            };
            let tracked = index.entries_under_path(root.unwrap_or(Path::new(".")));

            if files.is_empty() && tracked.is_empty() {
                missing.push(path.clone());
                continue;
            }

            let present = files.iter().collect::<BTreeSet<_>>();
            for gone in tracked.iter().filter(|path| !present.contains(path)) {
                index.remove(gone);
                summary.removed.push(gone.clone());
            }

            for file in files {
                self.stage_file(&mut index, &file)?;
                summary.staged.push(file);
            }
        }

        if index.is_changed() {
            index.write_updates()?;
        }

        tracing::debug!(
            staged = summary.staged.len(),
            removed = summary.removed.len(),
            missing = missing.len(),
            "staged paths"
        );

        if missing.is_empty() {
            Ok(summary)
        } else {
            Err(RepoError::PathNotFound(missing).into())
        }
    }

    /// Stage every change in the working tree, deletions included
    pub async fn stage_all(&self) -> anyhow::Result<StageSummary> {
        self.stage(&[PathBuf::from(".")]).await
    }

    fn stage_root(path: &Path) -> Option<&Path> {
        if path.as_os_str().is_empty() || path == Path::new(".") {
            None
        } else {
            Some(path)
        }
    }

    fn stage_file(&self, index: &mut Index, file: &Path) -> anyhow::Result<()> {
        let stat = self
            .workspace()
            .stat_file(file)?
            .with_context(|| format!("{} disappeared while staging", file.display()))?;
        let blob = self.workspace().parse_blob(file)?;
        let oid = self.database().store(&blob)?;

        match index.entry_by_path(file) {
            Some(entry) if entry.oid == oid && entry.metadata == stat => {}
            _ => index.add(IndexEntry::new(file.to_path_buf(), oid, stat)),
        }
        Ok(())
    }
}
