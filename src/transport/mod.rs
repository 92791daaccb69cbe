//! A minimal smart transport
//!
//! - `pkt_line`: framing, timeouts and cancellation for every read and write
//! - `auth`: ed25519 challenge/response keys
//! - `url`: remote locations (ssh or local path)
//! - `connector`: how a byte stream to the serving side is opened
//! - `server`: the `upload-pack` and `receive-pack` services
//! - `client`: the requesting side of both services
//!
//! A session starts with the server's greeting (carrying a challenge when
//! the repository requires authentication) and its ref advertisement. Fetch
//! then sends `want`/`have` lines and receives a pack; push sends ref update
//! commands and a pack and receives a per-ref report.

use crate::areas::config::{CORE_KEY_PATH, CORE_SSH_COMMAND, Config};
use crate::artifacts::objects::object_id::ObjectId;
use crate::transport::auth::{Ed25519KeyProvider, KeyProvider};
use crate::transport::connector::Connector;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long one fetch, push or ref listing may take in total
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(600);

pub mod auth;
pub mod client;
pub mod connector;
pub mod pkt_line;
pub mod server;
pub mod url;

pub const PROTOCOL_VERSION: u32 = 1;

const DEFAULT_SSH_COMMAND: &str = "ssh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "upload-pack",
            Service::ReceivePack => "receive-pack",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload-pack" => Ok(Service::UploadPack),
            "receive-pack" => Ok(Service::ReceivePack),
            other => anyhow::bail!("unknown service {other}"),
        }
    }
}

/// Refs a remote advertised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRefs {
    /// Full ref name to object id, `HEAD` included when it resolves
    pub refs: BTreeMap<String, ObjectId>,
    /// The branch the remote's HEAD follows
    pub head: Option<String>,
}

impl RemoteRefs {
    /// Find a ref by full or short name (`main`, `heads/main`, `refs/heads/main`)
    pub fn find(&self, name: &str) -> Option<(&String, &ObjectId)> {
        ["", "refs/", "refs/heads/", "refs/tags/"]
            .iter()
            .find_map(|prefix| self.refs.get_key_value(&format!("{prefix}{name}")))
    }

    pub fn branches(&self) -> impl Iterator<Item = (&String, &ObjectId)> {
        self.refs
            .iter()
            .filter(|(name, _)| name.starts_with("refs/heads/"))
    }
}

/// How a push ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Accepted,
    /// The remote ref is not where we expected, or the new commit does not
    /// descend from it
    RejectedNonFastForward,
    RejectedByRemote(String),
    /// The connection failed after the push had started
    TransportError(String),
}

/// Knobs shared by every network operation
#[derive(Clone)]
pub struct TransportOptions {
    /// Bound on each individual read or write
    pub timeout: Duration,
    /// Bound on a whole session, from connecting to the last byte
    pub deadline: Duration,
    pub cancel: CancellationToken,
    /// Program (and leading arguments) used to reach ssh remotes
    pub ssh_command: String,
    pub key_provider: Option<Arc<dyn KeyProvider>>,
    /// Reach every remote through this instead of by url
    pub connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .field("ssh_command", &self.ssh_command)
            .field("has_key", &self.key_provider.is_some())
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            timeout: Duration::from_secs(30),
            deadline: DEFAULT_SESSION_DEADLINE,
            cancel: CancellationToken::new(),
            ssh_command: DEFAULT_SSH_COMMAND.to_string(),
            key_provider: None,
            connector: None,
        }
    }
}

impl TransportOptions {
    /// Timeout, ssh command and key from configuration
    ///
    /// The key comes from `core.key_path`, else `~/.gitc/id_ed25519` when that
    /// file exists.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let key_path = config
            .get(CORE_KEY_PATH)
            .map(PathBuf::from)
            .or_else(|| Ed25519KeyProvider::default_path().filter(|path| path.exists()));
        let key_provider = match key_path {
            Some(path) => Some(Arc::new(Ed25519KeyProvider::load(&path)?) as Arc<dyn KeyProvider>),
            None => None,
        };

        Ok(TransportOptions {
            timeout: config.timeout()?,
            deadline: DEFAULT_SESSION_DEADLINE,
            cancel: CancellationToken::new(),
            ssh_command: config
                .get(CORE_SSH_COMMAND)
                .unwrap_or_else(|| DEFAULT_SSH_COMMAND.to_string()),
            key_provider,
            connector: None,
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, deadline: Duration) -> Self {
        self.timeout = timeout;
        self.deadline = deadline;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }
}
