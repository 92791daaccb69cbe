use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, REMOTES_PREFIX, RefName};
use crate::commands::porcelain::clone::DEFAULT_REMOTE;
use std::collections::BTreeMap;

impl Repository {
    pub fn add_remote(&self, name: &str, url: &str) -> anyhow::Result<()> {
        let name = BranchName::try_parse(name)?;
        let mut config = self.config()?;
        if config.remote_url(name.as_ref()).is_some() {
            anyhow::bail!("remote {name} already exists");
        }
        config.set(&format!("remote.{name}.url"), url)?;
        tracing::info!(remote = %name, url, "added remote");
        Ok(())
    }

    /// Configured remotes, `name -> url`
    pub fn list_remotes(&self) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(self.config()?.remotes())
    }

    /// Forget a remote along with its remote-tracking refs
    pub async fn remove_remote(&self, name: &str) -> anyhow::Result<()> {
        let mut config = self.config()?;
        if !config.remove_section(&format!("remote.{name}"))? {
            anyhow::bail!("no such remote: {name}");
        }

        let _lock = self.lock().await?;
        for (tracking, _) in self.refs().list(&format!("{REMOTES_PREFIX}{name}/"))? {
            self.refs().delete(&tracking)?;
        }
        tracing::info!(remote = name, "removed remote");
        Ok(())
    }

    /// Record `remote` as where `branch` is pushed to and pulled from
    pub fn set_upstream(&self, branch: &BranchName, remote: &str) -> anyhow::Result<()> {
        let mut config = self.config()?;
        config.set(&format!("branch.{branch}.remote"), remote)?;
        config.set(&format!("branch.{branch}.merge"), RefName::branch(branch).as_str())?;
        tracing::info!(%branch, remote, "set upstream");
        Ok(())
    }

    /// The remote `branch` (the current branch by default) tracks, else `origin`
    pub fn upstream_remote(&self, branch: Option<&str>) -> anyhow::Result<String> {
        let branch = match branch {
            Some(branch) => Some(BranchName::try_parse(branch)?),
            None => self.refs().current_branch()?,
        };
        let configured = match branch {
            Some(branch) => self.config()?.get(&format!("branch.{branch}.remote")),
            None => None,
        };
        Ok(configured.unwrap_or_else(|| DEFAULT_REMOTE.to_string()))
    }
}
