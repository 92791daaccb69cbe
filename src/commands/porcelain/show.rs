use crate::areas::repository::Repository;
use crate::commands::porcelain::diff::FilePatch;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;

#[derive(Debug, Clone)]
pub struct ShowInfo {
    pub oid: ObjectId,
    pub commit: Commit,
    /// Changes against the first parent (everything for a root commit)
    pub patches: Vec<FilePatch>,
}

impl Repository {
    pub fn show(&self, revision: &str) -> anyhow::Result<ShowInfo> {
        let oid = self.resolve_commit(revision)?;
        let commit = self.database().parse_object_as_commit(&oid)?;
        let patches = self.diff_commits(commit.parent(), &oid)?;

        Ok(ShowInfo { oid, commit, patches })
    }
}
