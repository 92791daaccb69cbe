//! Opening a byte stream to the serving side
//!
//! Local-path remotes are served in-process over a duplex pipe; ssh remotes
//! run `gitc serve <service> <path>` on the remote host through the
//! configured ssh command.

use crate::areas::repository::Repository;
use crate::error::RepoError;
use crate::transport::server::serve;
use crate::transport::url::RemoteUrl;
use crate::transport::{Service, TransportOptions};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const PIPE_CAPACITY: usize = 256 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Whatever runs the other end; stopped when the connection is dropped
pub enum Peer {
    Task(JoinHandle<()>),
    Process(Child),
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Peer::Task(handle) = self {
            handle.abort();
        }
    }
}

pub struct Connection {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub peer: Peer,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, service: Service) -> anyhow::Result<Connection>;
}

/// Serves a repository on this machine from a background task
pub struct LocalConnector {
    path: PathBuf,
    timeout: Duration,
}

impl LocalConnector {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        LocalConnector { path, timeout }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, service: Service) -> anyhow::Result<Connection> {
        let repository = Repository::open(&self.path).map_err(|e| {
            RepoError::Unreachable(format!("{}: {e}", self.path.display()))
        })?;

        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_reader, server_writer) = tokio::io::split(server);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            if let Err(e) = serve(&repository, service, server_reader, server_writer, timeout).await {
                tracing::warn!(error = %e, %service, "local service failed");
            }
        });

        let (reader, writer) = tokio::io::split(client);
        tracing::debug!(path = %self.path.display(), %service, "connected to local repository");
        Ok(Connection {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: Peer::Task(handle),
        })
    }
}

/// Runs the service on a remote host through ssh
pub struct SshConnector {
    ssh_command: String,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
}

impl SshConnector {
    pub fn new(ssh_command: String, user: Option<String>, host: String, port: Option<u16>, path: String) -> Self {
        SshConnector {
            ssh_command,
            user,
            host,
            port,
            path,
        }
    }

    fn build_command(&self, service: Service) -> anyhow::Result<Command> {
        let mut words = self.ssh_command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| anyhow::anyhow!("core.ssh_command is empty"))?;

        let mut command = Command::new(program);
        command.args(words);
        if let Some(port) = self.port {
            command.arg("-p").arg(port.to_string());
        }
        let destination = match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        };
        command
            .arg(destination)
            .arg(format!("gitc serve {service} '{}'", self.path.replace('\'', r"'\''")))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        Ok(command)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, service: Service) -> anyhow::Result<Connection> {
        let mut command = self.build_command(service)?;
        let mut child = command.spawn().map_err(|e| {
            RepoError::Unreachable(format!("cannot run {}: {e}", self.ssh_command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RepoError::Unreachable("ssh stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RepoError::Unreachable("ssh stdout unavailable".to_string()))?;

        tracing::debug!(host = %self.host, path = %self.path, %service, pid = ?child.id(), "spawned ssh");
        Ok(Connection {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            peer: Peer::Process(child),
        })
    }
}

/// Pick the connector for a remote url; local paths are relative to `base`
///
/// A connector set in `options` wins over the url.
pub fn connector_for(url: &RemoteUrl, base: &Path, options: &TransportOptions) -> Arc<dyn Connector> {
    if let Some(connector) = &options.connector {
        return Arc::clone(connector);
    }

    match url {
        RemoteUrl::Local(path) => Arc::new(LocalConnector::new(base.join(path), options.timeout)),
        RemoteUrl::Ssh {
            user,
            host,
            port,
            path,
        } => Arc::new(SshConnector::new(
            options.ssh_command.clone(),
            user.clone(),
            host.clone(),
            *port,
            path.clone(),
        )),
    }
}
