//! Layered TOML configuration
//!
//! Keys are dotted (`user.name`, `remote.origin.url`) and map onto nested
//! TOML tables. The repository file (`.gitc/config`) is layered over the
//! global file (`$GITC_CONFIG_GLOBAL`, else `~/.gitc/config`); writes only
//! ever touch the repository file.

use crate::artifacts::core::lockfile::Lockfile;
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::{Table, Value};

pub const GLOBAL_CONFIG_ENV: &str = "GITC_CONFIG_GLOBAL";

pub const USER_NAME: &str = "user.name";
pub const USER_EMAIL: &str = "user.email";
pub const CORE_SSH_COMMAND: &str = "core.ssh_command";
pub const CORE_TIMEOUT_SECS: &str = "core.timeout_secs";
pub const CORE_KEY_PATH: &str = "core.key_path";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Config {
    local_path: PathBuf,
    local: Table,
    global: Table,
}

impl Config {
    /// Load the repository file and whatever global file applies
    pub fn load(local_path: &Path) -> anyhow::Result<Self> {
        Self::load_with_global(local_path, Self::global_path().as_deref())
    }

    pub fn load_with_global(local_path: &Path, global_path: Option<&Path>) -> anyhow::Result<Self> {
        let global = match global_path {
            Some(path) => Self::read_table(path)?,
            None => Table::new(),
        };

        Ok(Config {
            local_path: local_path.to_path_buf(),
            local: Self::read_table(local_path)?,
            global,
        })
    }

    pub fn global_path() -> Option<PathBuf> {
        std::env::var_os(GLOBAL_CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitc").join("config"))
            })
    }

    /// The global file on its own, as the layer writes go to
    ///
    /// Empty when no global location can be determined.
    pub fn load_global() -> anyhow::Result<Self> {
        match Self::global_path() {
            Some(path) => Self::load_with_global(&path, None),
            None => Ok(Config {
                local_path: PathBuf::new(),
                local: Table::new(),
                global: Table::new(),
            }),
        }
    }

    fn read_table(path: &Path) -> anyhow::Result<Table> {
        match std::fs::read_to_string(path) {
            Ok(content) => content
                .parse::<Table>()
                .with_context(|| format!("invalid configuration in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e).with_context(|| format!("unable to read {}", path.display())),
        }
    }

    fn split_key(key: &str) -> anyhow::Result<(Vec<&str>, &str)> {
        let mut parts = key.split('.').collect::<Vec<_>>();
        if parts.len() < 2 || parts.iter().any(|part| part.is_empty()) {
            anyhow::bail!("invalid configuration key {key}, expected section.name");
        }
        let leaf = parts.pop().unwrap_or_default();
        Ok((parts, leaf))
    }

    fn lookup<'t>(table: &'t Table, key: &str) -> Option<&'t Value> {
        let (sections, leaf) = Self::split_key(key).ok()?;
        let mut current = table;
        for section in sections {
            current = current.get(section)?.as_table()?;
        }
        current.get(leaf)
    }

    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Repository value first, then global
    pub fn get(&self, key: &str) -> Option<String> {
        Self::lookup(&self.local, key)
            .or_else(|| Self::lookup(&self.global, key))
            .filter(|value| !value.is_table())
            .map(Self::render)
    }

    pub fn get_u64(&self, key: &str) -> anyhow::Result<Option<u64>> {
        self.get(key)
            .map(|value| {
                value
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a non-negative integer, got {value}"))
            })
            .transpose()
    }

    /// Network timeout from `core.timeout_secs`
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        Ok(self
            .get_u64(CORE_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let (sections, leaf) = Self::split_key(key)?;

        let mut current = &mut self.local;
        for section in sections {
            let entry = current
                .entry(section.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            current = entry
                .as_table_mut()
                .with_context(|| format!("{section} in {key} is a value, not a section"))?;
        }
        current.insert(leaf.to_string(), Value::String(value.to_string()));

        tracing::debug!(key, "set configuration value");
        self.save()
    }

    /// Remove a repository value; false when it was not set
    pub fn unset(&mut self, key: &str) -> anyhow::Result<bool> {
        let (sections, leaf) = Self::split_key(key)?;

        let mut current = &mut self.local;
        for section in &sections {
            match current.get_mut(*section).and_then(Value::as_table_mut) {
                Some(table) => current = table,
                None => return Ok(false),
            }
        }
        if current.remove(leaf).is_none() {
            return Ok(false);
        }

        Self::prune_empty(&mut self.local);
        self.save()?;
        Ok(true)
    }

    /// Drop a whole section such as `remote.origin`
    pub fn remove_section(&mut self, section: &str) -> anyhow::Result<bool> {
        let parts = section.split('.').collect::<Vec<_>>();
        let Some((last, parents)) = parts.split_last() else {
            return Ok(false);
        };

        let mut current = &mut self.local;
        for part in parents {
            match current.get_mut(*part).and_then(Value::as_table_mut) {
                Some(table) => current = table,
                None => return Ok(false),
            }
        }
        if current.remove(*last).is_none() {
            return Ok(false);
        }

        Self::prune_empty(&mut self.local);
        self.save()?;
        Ok(true)
    }

    fn prune_empty(table: &mut Table) {
        let mut emptied = Vec::new();
        for (name, value) in table.iter_mut() {
            if let Value::Table(inner) = value {
                Self::prune_empty(inner);
                if inner.is_empty() {
                    emptied.push(name.clone());
                }
            }
        }
        for name in emptied {
            table.remove(&name);
        }
    }

    fn flatten(prefix: &str, table: &Table, into: &mut BTreeMap<String, String>) {
        for (name, value) in table {
            let key = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match value {
                Value::Table(inner) => Self::flatten(&key, inner, into),
                other => {
                    into.insert(key, Self::render(other));
                }
            }
        }
    }

    /// Every effective `key = value`, sorted by key
    pub fn list(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        Self::flatten("", &self.global, &mut values);
        Self::flatten("", &self.local, &mut values);
        values
    }

    /// Configured remotes as `name -> url`
    pub fn remotes(&self) -> BTreeMap<String, String> {
        self.list()
            .into_iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix("remote.")?.strip_suffix(".url")?;
                Some((name.to_string(), value))
            })
            .collect()
    }

    pub fn remote_url(&self, name: &str) -> Option<String> {
        self.get(&format!("remote.{name}.url"))
    }

    fn save(&self) -> anyhow::Result<()> {
        let content = toml::to_string(&self.local).context("unable to serialize configuration")?;

        let mut lock = Lockfile::acquire_blocking(&self.local_path, WRITE_LOCK_TIMEOUT)?;
        lock.write(content.as_bytes())?;
        lock.commit()
    }
}
