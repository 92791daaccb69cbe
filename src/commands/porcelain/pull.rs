use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::merge::{MergeOptions, MergeOutcome};
use crate::error::RepoError;
use crate::transport::TransportOptions;

impl Repository {
    /// Fetch `branch` (the current branch's name by default) and merge it
    ///
    /// On an unborn branch the fetched commit is simply checked out.
    pub async fn pull(
        &self,
        remote: &str,
        branch: Option<&str>,
        options: MergeOptions,
        transport: &TransportOptions,
    ) -> anyhow::Result<MergeOutcome> {
        let branch = match branch {
            Some(branch) => BranchName::try_parse(branch)?,
            None => self
                .refs()
                .current_branch()?
                .ok_or_else(|| anyhow::anyhow!("HEAD is detached, name the branch to pull"))?,
        };

        let summary = self.fetch(remote, &[branch.to_string()], transport).await?;
        let remote_ref = RefName::branch(&branch);
        let theirs = summary
            .fetched
            .get(remote_ref.as_str())
            .cloned()
            .ok_or_else(|| RepoError::UnknownRef(remote_ref.to_string()))?;

        if self.refs().read_head()?.is_none() {
            self.checkout_tree(&theirs, false).await?;
            self.refs().update(&RefName::head(), None, &theirs)?;
            tracing::info!(commit = %theirs.to_short_oid(), "pulled into an unborn branch");
            return Ok(MergeOutcome::FastForwarded(theirs));
        }

        let options = MergeOptions {
            message: options
                .message
                .or_else(|| Some(format!("Merge branch '{branch}' of {remote}"))),
            ..options
        };
        self.merge(&theirs.to_string(), options).await
    }
}
