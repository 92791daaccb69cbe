use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, HEADS_PREFIX, REFS_PREFIX, RefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::object_walk::ObjectWalk;
use crate::artifacts::pack::writer::write_pack;
use crate::error::RepoError;
use crate::transport::client::RemoteSession;
use crate::transport::server::RefUpdateCommand;
use crate::transport::{PushResult, Service, TransportOptions};

impl Repository {
    /// Move `reference` on `remote` from `old_expected` to `new`
    ///
    /// The remote is checked before anything is uploaded: when its ref is
    /// not at `old_expected`, or `new` does not descend from it, the push is
    /// rejected as non-fast-forward. Connection problems while opening the
    /// session are errors; once the upload has started they become
    /// [`PushResult::TransportError`].
    pub async fn push_ref(
        &self,
        remote: &str,
        reference: &str,
        new: &ObjectId,
        old_expected: Option<&ObjectId>,
        options: &TransportOptions,
    ) -> anyhow::Result<PushResult> {
        let location = self.remote_location(remote)?;
        let name = qualify(reference)?;
        if !self.database().exists(new) {
            return Err(RepoError::NotFound(new.clone()).into());
        }

        let session = RemoteSession::open(&location.url, self.path(), Service::ReceivePack, options).await?;
        let current = session.refs().refs.get(name.as_str()).cloned();

        if current.as_ref() != old_expected {
            tracing::info!(reference = %name, expected = ?old_expected, actual = ?current, "remote moved, rejecting push");
            session.close().await;
            return Ok(PushResult::RejectedNonFastForward);
        }
        if let Some(old) = old_expected
            && !self.descends_from(new, old)?
        {
            tracing::info!(reference = %name, "not a fast-forward, rejecting push");
            session.close().await;
            return Ok(PushResult::RejectedNonFastForward);
        }

        let pack = {
            let known = session
                .refs()
                .refs
                .values()
                .filter(|oid| self.database().exists(oid))
                .cloned()
                .collect::<Vec<_>>();
            let mut walk = ObjectWalk::new(self.database());
            walk.hide(&known)?;
            let objects = walk.collect(std::slice::from_ref(new))?;
            tracing::debug!(reference = %name, objects = objects.len(), "uploading pack");
            write_pack(&objects)?
        };

        let command = RefUpdateCommand {
            old: old_expected.cloned(),
            new: Some(new.clone()),
            name: name.to_string(),
        };
        let result = match session.push(&[command], &pack).await {
            Ok(report) => report.result_for(name.as_str()),
            Err(e) if matches!(RepoError::find(&e), Some(RepoError::Cancelled | RepoError::Timeout { .. })) => {
                return Err(e);
            }
            Err(e) => PushResult::TransportError(format!("{e:#}")),
        };

        if result == PushResult::Accepted
            && let Some(remote_name) = &location.name
            && let Some(branch) = name.as_str().strip_prefix(HEADS_PREFIX)
        {
            let _lock = self.lock().await?;
            let tracking = RefName::remote(remote_name, &BranchName::try_parse(branch)?);
            let (_, previous) = self.refs().follow(&tracking)?;
            self.refs().update(&tracking, previous.as_ref(), new)?;
        }
        tracing::info!(reference = %name, ?result, "push finished");

        Ok(result)
    }

    /// Push a local branch (the current one by default) to the same name
    ///
    /// The remote-tracking ref is the expected remote value, so a push made
    /// without fetching someone else's work first is rejected.
    pub async fn push(
        &self,
        remote: &str,
        branch: Option<&str>,
        options: &TransportOptions,
    ) -> anyhow::Result<PushResult> {
        let branch = match branch {
            Some(branch) => BranchName::try_parse(branch)?,
            None => self
                .refs()
                .current_branch()?
                .ok_or_else(|| anyhow::anyhow!("HEAD is detached, name the branch to push"))?,
        };
        let new = self.refs().resolve(&RefName::branch(&branch).to_string())?;

        let location = self.remote_location(remote)?;
        let old_expected = match &location.name {
            Some(remote_name) => self.refs().follow(&RefName::remote(remote_name, &branch))?.1,
            None => self
                .list_remote_refs(remote, options)
                .await?
                .refs
                .get(RefName::branch(&branch).as_str())
                .cloned(),
        };

        self.push_ref(remote, branch.as_ref(), &new, old_expected.as_ref(), options)
            .await
    }

    fn descends_from(&self, descendant: &ObjectId, ancestor: &ObjectId) -> anyhow::Result<bool> {
        if !self.database().exists(ancestor) {
            return Ok(false);
        }
        self.bca_finder().is_ancestor(ancestor, descendant)
    }
}

/// `main` means `refs/heads/main`
fn qualify(reference: &str) -> anyhow::Result<RefName> {
    if reference.starts_with(REFS_PREFIX) {
        RefName::try_parse(reference)
    } else {
        Ok(RefName::branch(&BranchName::try_parse(reference)?))
    }
}
