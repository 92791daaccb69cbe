//! Serving side of `upload-pack` (fetch) and `receive-pack` (push)

use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{HEADS_PREFIX, RefName, TAGS_PREFIX};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::object_walk::ObjectWalk;
use crate::artifacts::pack::reader::read_pack;
use crate::artifacts::pack::writer::write_pack;
use crate::error::RepoError;
use crate::transport::auth::{AuthorizedKeys, new_challenge};
use crate::transport::pkt_line::PktStream;
use crate::transport::{PROTOCOL_VERSION, Service};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// One requested ref move in a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateCommand {
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
    pub name: String,
}

impl RefUpdateCommand {
    pub fn to_line(&self) -> String {
        let id = |oid: &Option<ObjectId>| oid.clone().unwrap_or_else(ObjectId::zero);
        format!("{} {} {}", id(&self.old), id(&self.new), self.name)
    }

    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let mut parts = line.splitn(3, ' ');
        let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RepoError::Protocol(format!("bad update command {line:?}")).into());
        };
        let id = |hex: &str| -> anyhow::Result<Option<ObjectId>> {
            let oid = ObjectId::try_parse(hex.to_string())?;
            Ok((!oid.is_zero()).then_some(oid))
        };

        Ok(RefUpdateCommand {
            old: id(old)?,
            new: id(new)?,
            name: name.to_string(),
        })
    }
}

/// Speak `service` for `repository` over a byte stream until the client is done
pub async fn serve<R, W>(
    repository: &Repository,
    service: Service,
    reader: R,
    writer: W,
    timeout: Duration,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut stream = PktStream::new(reader, writer, timeout, CancellationToken::new());
    tracing::debug!(%service, repository = %repository.path().display(), "serving");

    if !authenticate(repository, service, &mut stream).await? {
        return Ok(());
    }
    advertise_refs(repository, &mut stream).await?;

    match service {
        Service::UploadPack => upload_pack(repository, &mut stream).await,
        Service::ReceivePack => receive_pack(repository, &mut stream).await,
    }
}

async fn authenticate<R, W>(
    repository: &Repository,
    service: Service,
    stream: &mut PktStream<R, W>,
) -> anyhow::Result<bool>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let greeting = format!("gitc {service} {PROTOCOL_VERSION}");
    let Some(keys) = AuthorizedKeys::load(repository.git_dir())? else {
        stream.write_line(&greeting).await?;
        return Ok(true);
    };

    let challenge = new_challenge();
    stream
        .write_line(&format!("{greeting} challenge {}", hex::encode(challenge)))
        .await?;
    stream.sync().await?;

    let answer = stream.read_line().await?.unwrap_or_default();
    let accepted = answer
        .strip_prefix("auth ")
        .and_then(|rest| rest.split_once(' '))
        .and_then(|(public_key, signature)| Some((hex::decode(public_key).ok()?, hex::decode(signature).ok()?)))
        .is_some_and(|(public_key, signature)| keys.verify(&public_key, &challenge, &signature));

    if accepted {
        stream.write_line("ok").await?;
        Ok(true)
    } else {
        tracing::warn!("refused client with an unknown key");
        stream.write_line("error key not authorized").await?;
        stream.flush().await?;
        Ok(false)
    }
}

async fn advertise_refs<R, W>(repository: &Repository, stream: &mut PktStream<R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let refs = repository.refs();
    if let Some(head) = refs.read_head()? {
        stream.write_line(&format!("{head} HEAD")).await?;
    }
    if let Some(branch) = refs.current_branch()? {
        stream
            .write_line(&format!("symref HEAD {}", RefName::branch(&branch)))
            .await?;
    }
    for (name, oid) in refs.list("refs/")? {
        stream.write_line(&format!("{oid} {name}")).await?;
    }
    stream.flush().await
}

async fn upload_pack<R, W>(repository: &Repository, stream: &mut PktStream<R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut wants = Vec::new();
    let mut haves = Vec::new();
    for line in stream.read_section().await? {
        match line.split_once(' ') {
            Some(("want", oid)) => wants.push(ObjectId::try_parse(oid.to_string())?),
            Some(("have", oid)) => haves.push(ObjectId::try_parse(oid.to_string())?),
            _ => return Err(RepoError::Protocol(format!("unexpected line {line:?}")).into()),
        }
    }
    if wants.is_empty() {
        return Ok(());
    }

    if let Some(unknown) = wants.iter().find(|oid| !repository.database().exists(oid)) {
        stream.write_line(&format!("error unknown object {unknown}")).await?;
        return stream.flush().await;
    }

    let pack = {
        let mut walk = ObjectWalk::new(repository.database());
        walk.hide(&haves)?;
        write_pack(&walk.collect(&wants)?)?
    };
    tracing::debug!(wants = wants.len(), haves = haves.len(), bytes = pack.len(), "sending pack");

    stream.write_line("pack").await?;
    stream.write_data(&pack).await
}

async fn receive_pack<R, W>(repository: &Repository, stream: &mut PktStream<R, W>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let commands = stream
        .read_section()
        .await?
        .iter()
        .map(|line| RefUpdateCommand::parse(line))
        .collect::<anyhow::Result<Vec<_>>>()?;
    if commands.is_empty() {
        return Ok(());
    }

    let pack = stream.read_data().await?;
    let stored = read_pack(&pack).and_then(|objects| repository.database().store_batch(&objects));
    match stored {
        Ok(stored) => {
            tracing::debug!(objects = stored.len(), "received pack");
            stream.write_line("unpack ok").await?;
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejected pack");
            stream.write_line(&format!("unpack error {e}")).await?;
            return stream.flush().await;
        }
    }

    let reports = {
        let _lock = repository.lock().await?;
        commands
            .iter()
            .map(|command| match apply_update(repository, command) {
                Ok(()) => format!("ok {}", command.name),
                Err(reason) => format!("ng {} {reason}", command.name),
            })
            .collect::<Vec<_>>()
    };

    for report in reports {
        stream.write_line(&report).await?;
    }
    stream.flush().await
}

/// Apply one pushed ref move; the error is the reason reported back
fn apply_update(repository: &Repository, command: &RefUpdateCommand) -> Result<(), String> {
    let name = RefName::try_parse(command.name.as_str()).map_err(|e| e.to_string())?;
    if !name.as_str().starts_with(HEADS_PREFIX) && !name.as_str().starts_with(TAGS_PREFIX) {
        return Err("only branches and tags can be pushed".to_string());
    }

    let Some(new) = &command.new else {
        let current = repository.refs().try_resolve(name.as_str()).map_err(|e| e.to_string())?;
        if current != command.old {
            return Err("stale expected value, fetch first".to_string());
        }
        return repository
            .refs()
            .delete(&name)
            .map(|_| ())
            .map_err(|e| e.to_string());
    };

    if let Some(old) = &command.old {
        let descends = repository
            .bca_finder()
            .is_ancestor(old, new)
            .map_err(|e| e.to_string())?;
        if !descends {
            return Err("non-fast-forward".to_string());
        }
    }

    match repository.refs().update(&name, command.old.as_ref(), new) {
        Ok(()) => {
            tracing::info!(reference = %name, new = %new.to_short_oid(), "accepted push");
            Ok(())
        }
        Err(e) if matches!(RepoError::find(&e), Some(RepoError::Conflict { .. })) => {
            Err("stale expected value, fetch first".to_string())
        }
        Err(e) => Err(e.to_string()),
    }
}
