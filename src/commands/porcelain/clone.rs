use crate::areas::repository::Repository;
use crate::areas::workspace::REPOSITORY_DIR;
use crate::artifacts::branch::branch_name::{BranchName, HEADS_PREFIX, RefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::commands::porcelain::fetch::FetchSummary;
use crate::commands::porcelain::init::DEFAULT_BRANCH;
use crate::transport::TransportOptions;
use crate::transport::url::RemoteUrl;
use anyhow::Context;
use std::path::Path;

pub const DEFAULT_REMOTE: &str = "origin";

impl Repository {
    /// Create `destination` as a copy of the repository at `url`
    ///
    /// The new repository gets an `origin` remote, tracking refs for every
    /// remote branch and a local branch for `branch` (by default the one the
    /// remote's HEAD follows), checked out. A failed clone removes what it
    /// created.
    pub async fn clone(
        url: &str,
        destination: &Path,
        branch: Option<&str>,
        options: &TransportOptions,
    ) -> anyhow::Result<(Repository, FetchSummary)> {
        if destination.exists()
            && destination
                .read_dir()
                .with_context(|| format!("unable to read {}", destination.display()))?
                .next()
                .is_some()
        {
            anyhow::bail!("destination {} already exists and is not empty", destination.display());
        }

        let url = match RemoteUrl::parse(url)? {
            RemoteUrl::Local(path) if path.is_relative() => std::env::current_dir()?
                .join(path)
                .to_string_lossy()
                .into_owned(),
            _ => url.to_string(),
        };

        let created = !destination.exists();
        match Self::clone_into(&url, destination, branch, options).await {
            Ok(cloned) => Ok(cloned),
            Err(e) => {
                let cleanup = if created {
                    std::fs::remove_dir_all(destination)
                } else {
                    std::fs::remove_dir_all(destination.join(REPOSITORY_DIR))
                };
                if let Err(cleanup) = cleanup {
                    tracing::warn!(error = %cleanup, "could not clean up after failed clone");
                }
                Err(e)
            }
        }
    }

    async fn clone_into(
        url: &str,
        destination: &Path,
        requested: Option<&str>,
        options: &TransportOptions,
    ) -> anyhow::Result<(Repository, FetchSummary)> {
        let repository = Repository::init(destination)?;
        repository.add_remote(DEFAULT_REMOTE, url)?;
        let summary = repository.fetch(DEFAULT_REMOTE, &[], options).await?;

        let chosen = match requested {
            Some(name) => {
                let full = format!("{HEADS_PREFIX}{name}");
                let oid = summary
                    .fetched
                    .get(&full)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("remote branch {name} not found in {url}"))?;
                Some((name.to_string(), oid))
            }
            None => default_branch(&summary),
        };
        let Some((branch, oid)) = chosen else {
            tracing::info!(url, "cloned an empty repository");
            return Ok((repository, summary));
        };

        let branch = BranchName::try_parse(branch)?;
        repository
            .refs()
            .create_symbolic(&RefName::head(), &RefName::branch(&branch))?;
        repository.checkout_tree(&oid, false).await?;
        repository.refs().create_branch(&branch, &oid)?;

        tracing::info!(url, %branch, "cloned");
        Ok((repository, summary))
    }
}

/// The branch the remote's HEAD follows, else `main`, else the first one
fn default_branch(summary: &FetchSummary) -> Option<(String, ObjectId)> {
    let branch_of = |name: &str| {
        let short = name.strip_prefix(HEADS_PREFIX)?;
        Some((short.to_string(), summary.fetched.get(name)?.clone()))
    };

    summary
        .remote_head
        .as_deref()
        .and_then(branch_of)
        .or_else(|| branch_of(&format!("{HEADS_PREFIX}{DEFAULT_BRANCH}")))
        .or_else(|| {
            summary
                .fetched
                .keys()
                .find(|name| name.starts_with(HEADS_PREFIX))
                .and_then(|name| branch_of(name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(branches: &[&str], head: Option<&str>) -> FetchSummary {
        FetchSummary {
            fetched: branches
                .iter()
                .map(|name| (format!("{HEADS_PREFIX}{name}"), ObjectId::hash_of(name.as_bytes())))
                .collect(),
            remote_head: head.map(|head| format!("{HEADS_PREFIX}{head}")),
            ..Default::default()
        }
    }

    #[test]
    fn remote_head_wins_then_main_then_first_branch() {
        let pick = |summary: FetchSummary| default_branch(&summary).map(|(name, _)| name);

        assert_eq!(pick(summary(&["dev", "main"], Some("dev"))), Some("dev".to_string()));
        assert_eq!(pick(summary(&["dev", "main"], None)), Some("main".to_string()));
        assert_eq!(pick(summary(&["b", "a"], None)), Some("a".to_string()));
        assert_eq!(pick(summary(&[], None)), None);
    }
}
