//! Remote locations
//!
//! Accepted forms:
//!
//! - `ssh://[user@]host[:port]/path`
//! - `[user@]host:path` (scp-like)
//! - `file:///path` or a plain local path

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    Local(PathBuf),
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
        path: String,
    },
}

impl RemoteUrl {
    pub fn parse(url: &str) -> anyhow::Result<Self> {
        if url.is_empty() {
            anyhow::bail!("empty remote url");
        }
        if let Some(rest) = url.strip_prefix("ssh://") {
            return Self::parse_ssh(rest);
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(RemoteUrl::Local(PathBuf::from(path)));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            anyhow::bail!("HTTP remotes are not supported, use ssh:// or a local path: {url}");
        }

        // scp-like when a colon comes before any slash
        match url.split_once(':') {
            Some((authority, path))
                if !authority.is_empty() && !authority.contains('/') && !path.is_empty() =>
            {
                let (user, host) = Self::split_user(authority);
                Ok(RemoteUrl::Ssh {
                    user,
                    host: host.to_string(),
                    port: None,
                    path: path.to_string(),
                })
            }
            _ => Ok(RemoteUrl::Local(PathBuf::from(url))),
        }
    }

    fn parse_ssh(rest: &str) -> anyhow::Result<Self> {
        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("ssh url without a path: ssh://{rest}"))?;
        let (user, host_port) = Self::split_user(authority);
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (
                host,
                Some(port.parse::<u16>().map_err(|_| anyhow::anyhow!("invalid ssh port {port}"))?),
            ),
            None => (host_port, None),
        };
        if host.is_empty() {
            anyhow::bail!("ssh url without a host: ssh://{rest}");
        }

        Ok(RemoteUrl::Ssh {
            user,
            host: host.to_string(),
            port,
            path: format!("/{path}"),
        })
    }

    fn split_user(authority: &str) -> (Option<String>, &str) {
        match authority.split_once('@') {
            Some((user, host)) => (Some(user.to_string()), host),
            None => (None, authority),
        }
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteUrl::Local(path) => write!(f, "{}", path.display()),
            RemoteUrl::Ssh { user, host, port, path } => {
                write!(f, "ssh://")?;
                if let Some(user) = user {
                    write!(f, "{user}@")?;
                }
                write!(f, "{host}")?;
                if let Some(port) = port {
                    write!(f, ":{port}")?;
                }
                write!(f, "{path}")
            }
        }
    }
}
