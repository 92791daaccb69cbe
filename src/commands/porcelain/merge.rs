use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::merge::resolve::Resolve;
use crate::artifacts::merge::{MergeOptions, MergeOutcome};
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::RepoError;

impl Repository {
    /// Best common ancestor of two commits
    ///
    /// Among several equally good ancestors the newest wins, ties broken by
    /// the smaller id, so the answer is the same whichever order `a` and `b`
    /// come in.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> anyhow::Result<ObjectId> {
        self.bca_finder()
            .find_best_common_ancestor(a, b)?
            .ok_or_else(|| RepoError::Unrelated(a.clone(), b.clone()).into())
    }

    /// Three-way merge of two commits, touching no ref, index or file
    ///
    /// A clean non-fast-forward merge stores its tree and a two-parent commit
    /// and returns [`MergeOutcome::Merged`]; moving a branch there is up to
    /// the caller.
    pub fn merge_commits(
        &self,
        ours: &ObjectId,
        theirs: &ObjectId,
        options: &MergeOptions,
    ) -> anyhow::Result<MergeOutcome> {
        let base = {
            let finder = self.bca_finder();
            if ours == theirs || finder.is_ancestor(theirs, ours)? {
                return Ok(MergeOutcome::AlreadyUpToDate(ours.clone()));
            }
            finder
                .find_best_common_ancestor(ours, theirs)?
                .ok_or_else(|| RepoError::Unrelated(ours.clone(), theirs.clone()))?
        };
        tracing::debug!(ours = %ours.to_short_oid(), theirs = %theirs.to_short_oid(), base = %base.to_short_oid(), "merging");

        if &base == ours && !options.no_ff {
            return Ok(MergeOutcome::FastForwarded(theirs.clone()));
        }

        let tree_files = |oid: &ObjectId| -> anyhow::Result<_> {
            let tree = self.database().peel_to_tree(oid)?;
            self.database().tree_files(Some(&tree))
        };
        let resolution = Resolve::new(self.database()).execute(
            &tree_files(&base)?,
            &tree_files(ours)?,
            &tree_files(theirs)?,
        )?;

        if !resolution.is_clean() {
            tracing::info!(conflicts = resolution.conflicts.len(), "merge has conflicts");
            return Ok(MergeOutcome::Conflicted(resolution.conflicts));
        }

        let message = match &options.message {
            Some(message) => message.trim().to_string(),
            None => format!("Merge {}", theirs.to_short_oid()),
        };
        let commit = Commit::new(
            vec![ours.clone(), theirs.clone()],
            self.write_tree(&resolution.merged)?,
            self.author()?,
            message,
        );

        Ok(MergeOutcome::Merged(self.database().store_commit(&commit)?))
    }

    /// Merge `revision` into the checked-out branch
    ///
    /// A conflicted merge is reported through [`MergeOutcome::Conflicted`] and
    /// changes nothing: working tree, index and refs stay as they were.
    pub async fn merge(&self, revision: &str, options: MergeOptions) -> anyhow::Result<MergeOutcome> {
        let _lock = self.lock().await?;

        let ours = self
            .refs()
            .read_head()?
            .ok_or_else(|| anyhow::anyhow!("cannot merge into a branch without commits"))?;
        let theirs = self.resolve_commit(revision)?;
        let options = MergeOptions {
            message: match options.message {
                Some(message) => Some(message),
                None => Some(self.default_merge_message(revision)?),
            },
            ..options
        };

        let outcome = self.merge_commits(&ours, &theirs, &options)?;
        let target = match &outcome {
            MergeOutcome::FastForwarded(oid) | MergeOutcome::Merged(oid) => oid.clone(),
            MergeOutcome::AlreadyUpToDate(_) | MergeOutcome::Conflicted(_) => return Ok(outcome),
        };

        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        self.advance_head(&mut index, &ours, &target)?;

        tracing::info!(commit = %target.to_short_oid(), ?outcome, "merged");
        Ok(outcome)
    }

    /// Check out `target` and move HEAD from `ours` to it
    ///
    /// When HEAD no longer names `ours` the working tree is put back and the
    /// index is left as it was on disk.
    pub(crate) fn advance_head(&self, index: &mut Index, ours: &ObjectId, target: &ObjectId) -> anyhow::Result<()> {
        self.migrate(index, Some(ours), target, false)?;
        if let Err(e) = self.refs().update(&RefName::head(), Some(ours), target) {
            self.migrate(index, Some(target), ours, true)?;
            return Err(e);
        }
        index.write_updates()
    }

    fn default_merge_message(&self, revision: &str) -> anyhow::Result<String> {
        Ok(match self.refs().current_branch()? {
            Some(branch) => format!("Merge {revision} into {branch}"),
            None => format!("Merge {revision}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::object_type::ObjectType;
    use crate::artifacts::objects::tree::TreeBuilder;
    use crate::artifacts::database::database_entry::DatabaseEntry;
    use crate::artifacts::index::entry_mode::EntryMode;
    use assert_fs::TempDir;
    use std::path::PathBuf;

    fn commit_with(repository: &Repository, parents: Vec<ObjectId>, files: &[(&str, &str)], seconds: i64) -> ObjectId {
        let entries = files
            .iter()
            .map(|(path, content)| {
                let oid = repository.database().write(ObjectType::Blob, content.as_bytes()).unwrap();
                (PathBuf::from(path), DatabaseEntry::new(oid, EntryMode::from_executable(false)))
            })
            .collect::<Vec<_>>();
        let builder = TreeBuilder::build(entries.iter().map(|(path, entry)| (path, entry.clone()))).unwrap();
        let root = builder
            .write_with(&mut |tree| repository.database().store(tree))
            .unwrap();
        let tree = repository.database().store(&root).unwrap();
        let when = chrono::DateTime::from_timestamp(seconds, 0).unwrap().fixed_offset();
        let author = Author::new_with_timestamp("t".into(), "t@example.com".into(), when);
        repository
            .database()
            .store_commit(&Commit::new(parents, tree, author, format!("at {seconds}")))
            .unwrap()
    }

    #[test]
    fn fast_forward_unless_disabled() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let base = commit_with(&repository, vec![], &[("a.txt", "a")], 1);
        let ahead = commit_with(&repository, vec![base.clone()], &[("a.txt", "b")], 2);

        let outcome = repository.merge_commits(&base, &ahead, &MergeOptions::default()).unwrap();
        assert_eq!(outcome, MergeOutcome::FastForwarded(ahead.clone()));

        let outcome = repository
            .merge_commits(&ahead, &base, &MergeOptions::default())
            .unwrap();
        assert_eq!(outcome, MergeOutcome::AlreadyUpToDate(ahead.clone()));
    }

    #[test]
    fn disjoint_changes_merge_into_a_two_parent_commit() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let base = commit_with(&repository, vec![], &[("a.txt", "a"), ("b.txt", "b")], 1);
        let ours = commit_with(&repository, vec![base.clone()], &[("a.txt", "A"), ("b.txt", "b")], 2);
        let theirs = commit_with(&repository, vec![base.clone()], &[("a.txt", "a"), ("b.txt", "B")], 3);
        let mut config = repository.config().unwrap();
        config.set("user.name", "t").unwrap();
        config.set("user.email", "t@example.com").unwrap();

        let MergeOutcome::Merged(merged) = repository
            .merge_commits(&ours, &theirs, &MergeOptions::default())
            .unwrap()
        else {
            panic!("expected a merge commit");
        };

        let commit = repository.database().parse_object_as_commit(&merged).unwrap();
        assert_eq!(commit.parents(), &[ours, theirs]);
        let files = repository
            .database()
            .tree_files(Some(commit.tree_oid()))
            .unwrap()
            .into_iter()
            .map(|(path, entry)| {
                let blob = repository.database().parse_object_as_blob(&entry.oid).unwrap();
                (path, String::from_utf8_lossy(blob.content()).into_owned())
            })
            .collect::<Vec<_>>();
        assert_eq!(
            files,
            vec![
                (PathBuf::from("a.txt"), "A".to_string()),
                (PathBuf::from("b.txt"), "B".to_string())
            ]
        );
    }

    #[test]
    fn unrelated_histories_have_no_base() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let one = commit_with(&repository, vec![], &[("a.txt", "a")], 1);
        let other = commit_with(&repository, vec![], &[("b.txt", "b")], 2);

        let err = repository.merge_base(&one, &other).unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Unrelated(..))));
        assert_eq!(repository.merge_base(&one, &one).unwrap(), one);
    }

    #[tokio::test]
    async fn moved_head_puts_the_working_tree_back() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        repository.stage(&[PathBuf::from("a.txt")]).await.unwrap();
        let when = chrono::DateTime::from_timestamp(1, 0).unwrap().fixed_offset();
        let author = Author::new_with_timestamp("t".into(), "t@example.com".into(), when);
        let base = repository.commit("base", Some(author)).await.unwrap().oid;
        let target = commit_with(&repository, vec![base.clone()], &[("a.txt", "b")], 2);
        let elsewhere = commit_with(&repository, vec![base.clone()], &[("a.txt", "a"), ("c.txt", "c")], 3);
        repository
            .refs()
            .update(&RefName::head(), Some(&base), &elsewhere)
            .unwrap();

        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        let err = repository.advance_head(&mut index, &base, &target).unwrap_err();

        assert!(matches!(RepoError::find(&err), Some(RepoError::Conflict { .. })));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "a");
        assert_eq!(repository.refs().read_head().unwrap(), Some(elsewhere));
    }
}
