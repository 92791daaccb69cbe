use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, HEADS_PREFIX, REMOTES_PREFIX, RefName};
use crate::artifacts::objects::object_id::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: RefName,
    pub oid: ObjectId,
    pub is_current: bool,
}

impl Repository {
    /// Local branches, plus remote-tracking ones when `remotes` is set
    pub fn list_branches(&self, remotes: bool) -> anyhow::Result<Vec<BranchInfo>> {
        let head = self.refs().head()?;
        let mut prefixes = vec![HEADS_PREFIX];
        if remotes {
            prefixes.push(REMOTES_PREFIX);
        }

        let mut branches = Vec::new();
        for prefix in prefixes {
            for (name, oid) in self.refs().list(prefix)? {
                branches.push(BranchInfo {
                    is_current: head == Head::Branch(name.clone()),
                    name,
                    oid,
                });
            }
        }
        Ok(branches)
    }

    /// Create a branch at `start` (HEAD when absent) without switching to it
    pub fn create_branch(&self, name: &str, start: Option<&str>) -> anyhow::Result<ObjectId> {
        let branch = BranchName::try_parse(name)?;
        let oid = match start {
            Some(start) => self.resolve_commit(start)?,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("not a valid object name: HEAD has no commits yet"))?,
        };

        self.refs().create_branch(&branch, &oid)?;
        tracing::info!(branch = %branch, at = %oid.to_short_oid(), "created branch");
        Ok(oid)
    }

    /// Delete a branch; unless `force`, it must be merged into HEAD
    pub async fn delete_branch(&self, name: &str, force: bool) -> anyhow::Result<ObjectId> {
        let branch = BranchName::try_parse(name)?;
        let ref_name = RefName::branch(&branch);
        let _lock = self.lock().await?;

        if !force {
            let oid = self.refs().resolve(ref_name.as_str())?;
            if let Some(head) = self.refs().read_head()?
                && !self.bca_finder().is_ancestor(&oid, &head)?
            {
                anyhow::bail!("the branch '{branch}' is not fully merged, use force to delete it anyway");
            }
        }

        let oid = self.refs().delete(&ref_name)?;
        tracing::info!(branch = %branch, "deleted branch");
        Ok(oid)
    }

    pub async fn rename_branch(&self, old: &str, new: &str) -> anyhow::Result<()> {
        let _lock = self.lock().await?;
        self.refs()
            .rename_branch(&BranchName::try_parse(old)?, &BranchName::try_parse(new)?)
    }
}
