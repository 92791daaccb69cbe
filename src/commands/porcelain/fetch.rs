use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, HEADS_PREFIX, RefName, TAGS_PREFIX};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::reader::read_pack;
use crate::error::RepoError;
use crate::transport::client::RemoteSession;
use crate::transport::url::RemoteUrl;
use crate::transport::{RemoteRefs, Service, TransportOptions};
use std::collections::{BTreeMap, BTreeSet};

/// A remote as named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// Configured name; `None` when a url was given directly
    pub name: Option<BranchName>,
    pub url: RemoteUrl,
}

/// A ref moved by a network operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: RefName,
    pub old: Option<ObjectId>,
    pub new: ObjectId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Objects newly written to the local store
    pub objects: BTreeSet<ObjectId>,
    /// Remote refs that were fetched, full name to id
    pub fetched: BTreeMap<String, ObjectId>,
    /// Local refs created or moved
    pub updated: Vec<RefUpdate>,
    /// What the remote's HEAD follows
    pub remote_head: Option<String>,
}

impl Repository {
    /// Look `remote` up among the configured remotes, else read it as a url
    pub fn remote_location(&self, remote: &str) -> anyhow::Result<RemoteLocation> {
        if let Some(url) = self.config()?.remote_url(remote) {
            return Ok(RemoteLocation {
                name: Some(BranchName::try_parse(remote)?),
                url: RemoteUrl::parse(&url)?,
            });
        }

        Ok(RemoteLocation {
            name: None,
            url: RemoteUrl::parse(remote)
                .map_err(|e| anyhow::anyhow!("{remote} is neither a configured remote nor a url: {e}"))?,
        })
    }

    /// Connect and return the remote's refs
    pub async fn list_remote_refs(
        &self,
        remote: &str,
        options: &TransportOptions,
    ) -> anyhow::Result<RemoteRefs> {
        let location = self.remote_location(remote)?;
        let session = RemoteSession::open(&location.url, self.path(), Service::UploadPack, options).await?;
        let refs = session.refs().clone();
        // an empty want list ends the session politely
        session.fetch_pack(&[], &[]).await?;

        Ok(refs)
    }

    /// Download what `wanted` refs need and record them as remote-tracking refs
    ///
    /// With no names every branch and tag is fetched. Objects are written only
    /// once the whole pack has arrived and every object in it checks out; a
    /// single bad object discards the batch.
    pub async fn fetch(
        &self,
        remote: &str,
        wanted: &[String],
        options: &TransportOptions,
    ) -> anyhow::Result<FetchSummary> {
        let location = self.remote_location(remote)?;
        let session = RemoteSession::open(&location.url, self.path(), Service::UploadPack, options).await?;
        let remote_refs = session.refs().clone();

        let fetched = select_refs(&remote_refs, wanted)?;
        let wants = fetched
            .values()
            .filter(|oid| !self.database().exists(oid))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let haves = self
            .refs()
            .list("refs/")?
            .into_iter()
            .map(|(_, oid)| oid)
            .filter(|oid| self.database().exists(oid))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        tracing::debug!(url = %location.url, wants = wants.len(), haves = haves.len(), "negotiated fetch");

        let pack = session.fetch_pack(&wants, &haves).await?;
        let objects = if wants.is_empty() {
            BTreeSet::new()
        } else {
            self.database().store_batch(&read_pack(&pack)?)?
        };

        if let Some(missing) = wants.iter().find(|oid| !self.database().exists(oid)) {
            return Err(RepoError::Protocol(format!("remote did not send {missing}")).into());
        }

        let updated = match &location.name {
            Some(name) => self.update_tracking_refs(name, &fetched).await?,
            None => Vec::new(),
        };
        tracing::info!(objects = objects.len(), refs = updated.len(), "fetched");

        Ok(FetchSummary {
            objects,
            fetched,
            updated,
            remote_head: remote_refs.head,
        })
    }

    /// Branches land under `refs/remotes/<remote>/`; tags are only created
    async fn update_tracking_refs(
        &self,
        remote: &BranchName,
        fetched: &BTreeMap<String, ObjectId>,
    ) -> anyhow::Result<Vec<RefUpdate>> {
        let _lock = self.lock().await?;
        let mut updated = Vec::new();

        for (name, oid) in fetched {
            let local = if let Some(branch) = name.strip_prefix(HEADS_PREFIX) {
                RefName::remote(remote, &BranchName::try_parse(branch)?)
            } else if name.starts_with(TAGS_PREFIX) {
                let tag = RefName::try_parse(name.as_str())?;
                if self.refs().read_raw(&tag)?.is_some() {
                    continue;
                }
                tag
            } else {
                continue;
            };

            let (_, old) = self.refs().follow(&local)?;
            if old.as_ref() == Some(oid) {
                continue;
            }
            self.refs().update(&local, old.as_ref(), oid)?;
            updated.push(RefUpdate {
                name: local,
                old,
                new: oid.clone(),
            });
        }

        Ok(updated)
    }
}

/// Refs to fetch; every branch and tag when `wanted` is empty
fn select_refs(remote_refs: &RemoteRefs, wanted: &[String]) -> anyhow::Result<BTreeMap<String, ObjectId>> {
    if wanted.is_empty() {
        return Ok(remote_refs
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(HEADS_PREFIX) || name.starts_with(TAGS_PREFIX))
            .map(|(name, oid)| (name.clone(), oid.clone()))
            .collect());
    }

    wanted
        .iter()
        .map(|name| {
            remote_refs
                .find(name)
                .map(|(name, oid)| (name.clone(), oid.clone()))
                .ok_or_else(|| RepoError::UnknownRef(name.clone()).into())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_refs() -> RemoteRefs {
        let mut refs = RemoteRefs::default();
        for name in ["HEAD", "refs/heads/main", "refs/heads/topic", "refs/tags/v1"] {
            refs.refs.insert(name.to_string(), ObjectId::hash_of(name.as_bytes()));
        }
        refs.head = Some("refs/heads/main".to_string());
        refs
    }

    #[test]
    fn everything_but_head_is_fetched_by_default() {
        let selected = select_refs(&remote_refs(), &[]).unwrap();

        assert_eq!(
            selected.keys().collect::<Vec<_>>(),
            vec!["refs/heads/main", "refs/heads/topic", "refs/tags/v1"]
        );
    }

    #[test]
    fn short_names_are_expanded_and_unknown_ones_fail() {
        let selected = select_refs(&remote_refs(), &["topic".to_string()]).unwrap();
        assert_eq!(selected.keys().collect::<Vec<_>>(), vec!["refs/heads/topic"]);

        let err = select_refs(&remote_refs(), &["nope".to_string()]).unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::UnknownRef(_))));
    }
}
