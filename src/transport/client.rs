//! Requesting side of a transport session

use crate::artifacts::objects::object_id::ObjectId;
use crate::error::RepoError;
use crate::transport::connector::{BoxedReader, BoxedWriter, Peer, connector_for};
use crate::transport::pkt_line::PktStream;
use crate::transport::server::RefUpdateCommand;
use crate::transport::url::RemoteUrl;
use crate::transport::{PROTOCOL_VERSION, PushResult, RemoteRefs, Service, TransportOptions};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;

/// An open connection past the handshake and ref advertisement
pub struct RemoteSession {
    stream: PktStream<BoxedReader, BoxedWriter>,
    refs: RemoteRefs,
    service: Service,
    _peer: Peer,
}

/// What the remote said about a push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Set when the remote could not store the pack
    pub unpack_error: Option<String>,
    /// Per ref: `None` when updated, else the reason it was refused
    pub statuses: BTreeMap<String, Option<String>>,
}

impl PushReport {
    pub fn result_for(&self, name: &str) -> PushResult {
        if let Some(error) = &self.unpack_error {
            return PushResult::RejectedByRemote(format!("unpack failed: {error}"));
        }

        match self.statuses.get(name) {
            Some(None) => PushResult::Accepted,
            Some(Some(reason)) if reason.starts_with("non-fast-forward") || reason.starts_with("stale") => {
                PushResult::RejectedNonFastForward
            }
            Some(Some(reason)) => PushResult::RejectedByRemote(reason.clone()),
            None => PushResult::RejectedByRemote(format!("no status reported for {name}")),
        }
    }
}

impl RemoteSession {
    /// Connect, authenticate when challenged and read the ref advertisement
    pub async fn open(
        url: &RemoteUrl,
        base: &Path,
        service: Service,
        options: &TransportOptions,
    ) -> anyhow::Result<Self> {
        let connection = connector_for(url, base, options).connect(service).await?;
        let mut stream = PktStream::new(
            connection.reader,
            connection.writer,
            options.timeout,
            options.cancel.clone(),
        )
        .with_deadline(options.deadline);

        let greeting = match stream.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(RepoError::Protocol("empty greeting".to_string()).into()),
            Err(e) if matches!(RepoError::find(&e), Some(RepoError::Protocol(_))) => {
                return Err(RepoError::Unreachable(format!("{url}: {e}")).into());
            }
            Err(e) => return Err(e),
        };

        if let Some(challenge) = parse_greeting(&greeting, service)? {
            answer_challenge(&mut stream, &challenge, options).await?;
        }

        let refs = read_advertisement(&mut stream).await?;
        tracing::debug!(%url, %service, refs = refs.refs.len(), "remote session open");

        Ok(RemoteSession {
            stream,
            refs,
            service,
            _peer: connection.peer,
        })
    }

    pub fn refs(&self) -> &RemoteRefs {
        &self.refs
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Ask for `wants`, telling the remote what we already have
    ///
    /// Returns the raw pack; empty when nothing was wanted.
    pub async fn fetch_pack(mut self, wants: &[ObjectId], haves: &[ObjectId]) -> anyhow::Result<Bytes> {
        for oid in wants {
            self.stream.write_line(&format!("want {oid}")).await?;
        }
        for oid in haves {
            self.stream.write_line(&format!("have {oid}")).await?;
        }
        self.stream.flush().await?;

        if wants.is_empty() {
            self.close().await;
            return Ok(Bytes::new());
        }

        let pack = match self.stream.read_line().await? {
            Some(line) if line == "pack" => self.stream.read_data().await?,
            Some(line) => {
                let reason = line.strip_prefix("error ").unwrap_or(&line).to_string();
                return Err(RepoError::Protocol(format!("remote refused fetch: {reason}")).into());
            }
            None => return Err(RepoError::Protocol("missing pack".to_string()).into()),
        };

        tracing::debug!(bytes = pack.len(), "received pack");
        self.close().await;
        Ok(pack)
    }

    /// Send ref update commands with the pack they need
    pub async fn push(mut self, commands: &[RefUpdateCommand], pack: &[u8]) -> anyhow::Result<PushReport> {
        for command in commands {
            self.stream.write_line(&command.to_line()).await?;
        }
        self.stream.flush().await?;

        if commands.is_empty() {
            self.close().await;
            return Ok(PushReport::default());
        }
        self.stream.write_data(pack).await?;

        let mut report = PushReport::default();
        match self.stream.read_line().await? {
            Some(line) if line == "unpack ok" => {}
            Some(line) => {
                let error = line.strip_prefix("unpack error ").unwrap_or(&line).to_string();
                report.unpack_error = Some(error);
                self.close().await;
                return Ok(report);
            }
            None => return Err(RepoError::Protocol("missing unpack status".to_string()).into()),
        }

        for line in self.stream.read_section().await? {
            if let Some(name) = line.strip_prefix("ok ") {
                report.statuses.insert(name.to_string(), None);
            } else if let Some((name, reason)) = line.strip_prefix("ng ").and_then(|rest| rest.split_once(' ')) {
                report.statuses.insert(name.to_string(), Some(reason.to_string()));
            } else {
                return Err(RepoError::Protocol(format!("unexpected status {line:?}")).into());
            }
        }

        self.close().await;
        Ok(report)
    }

    /// End the session; the remote sees end of stream
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(error = %e, "closing remote session");
        }
    }
}

/// Validate the greeting; returns the challenge when one was issued
fn parse_greeting(line: &str, service: Service) -> anyhow::Result<Option<Vec<u8>>> {
    let words = line.split(' ').collect::<Vec<_>>();
    let version = PROTOCOL_VERSION.to_string();

    match words.as_slice() {
        ["gitc", name, v] if *name == service.as_str() && *v == version => Ok(None),
        ["gitc", name, v, "challenge", challenge] if *name == service.as_str() && *v == version => {
            let challenge = hex::decode(challenge)
                .map_err(|_| RepoError::Protocol("malformed challenge".to_string()))?;
            Ok(Some(challenge))
        }
        _ => Err(RepoError::Protocol(format!("unexpected greeting {line:?}")).into()),
    }
}

async fn answer_challenge(
    stream: &mut PktStream<BoxedReader, BoxedWriter>,
    challenge: &[u8],
    options: &TransportOptions,
) -> anyhow::Result<()> {
    let provider = options
        .key_provider
        .as_ref()
        .ok_or_else(|| RepoError::AuthFailed("remote requires a key and none is configured".to_string()))?;

    let signature = provider.sign_challenge(challenge)?;
    stream
        .write_line(&format!(
            "auth {} {}",
            hex::encode(provider.public_key()),
            hex::encode(signature)
        ))
        .await?;
    stream.sync().await?;

    match stream.read_line().await? {
        Some(line) if line == "ok" => Ok(()),
        Some(line) => {
            let reason = line.strip_prefix("error ").unwrap_or(&line).to_string();
            Err(RepoError::AuthFailed(reason).into())
        }
        None => Err(RepoError::AuthFailed("remote closed the handshake".to_string()).into()),
    }
}

async fn read_advertisement(stream: &mut PktStream<BoxedReader, BoxedWriter>) -> anyhow::Result<RemoteRefs> {
    let mut refs = RemoteRefs::default();

    for line in stream.read_section().await? {
        if let Some(target) = line.strip_prefix("symref HEAD ") {
            refs.head = Some(target.to_string());
            continue;
        }
        let (oid, name) = line
            .split_once(' ')
            .ok_or_else(|| RepoError::Protocol(format!("bad advertisement {line:?}")))?;
        refs.refs
            .insert(name.to_string(), ObjectId::try_parse(oid.to_string())?);
    }

    Ok(refs)
}
