//! References (branches, HEAD, tags, remote-tracking refs)
//!
//! References are human-readable names pointing to objects. They can be:
//! - Direct: a file containing a 40-character object id
//! - Symbolic: a file containing `ref: <name>` (e.g. `HEAD -> refs/heads/main`)
//!
//! Every update is a compare-and-swap performed under `<ref>.lock`: the current
//! value is re-read while holding the lock, compared with what the caller
//! expected, and the new value is renamed into place. Readers never take a
//! lock and always see a complete value.

use crate::artifacts::branch::branch_name::{BranchName, HEAD_REF_NAME, HEADS_PREFIX, RefName};
use crate::artifacts::branch::{CompiledRegex, compiled};
use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::RepoError;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use walkdir::WalkDir;

/// Symbolic refs nested deeper than this are treated as a loop
pub const MAX_SYMREF_DEPTH: usize = 10;

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

static SYMREF: CompiledRegex = LazyLock::new(|| regex::Regex::new(SYMREF_REGEX));

/// Where short names are looked up, in order
const SEARCH_PREFIXES: [&str; 5] = ["", "refs/", "refs/heads/", "refs/tags/", "refs/remotes/"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(ObjectId),
    Symbolic(RefName),
}

/// What HEAD currently designates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// HEAD follows a branch, which may not exist yet (unborn)
    Branch(RefName),
    Detached(ObjectId),
}

#[derive(Debug)]
pub struct Refs {
    /// The `.gitc` directory
    path: Box<Path>,
    lock_timeout: Duration,
}

impl Refs {
    pub fn new(path: Box<Path>, lock_timeout: Duration) -> Self {
        Refs { path, lock_timeout }
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.path.join(name.as_str())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn heads_path(&self) -> PathBuf {
        self.path.join(HEADS_PREFIX)
    }

    /// Read one ref file without following it
    pub fn read_raw(&self, name: &RefName) -> anyhow::Result<Option<RefValue>> {
        let path = self.ref_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) if path.is_dir() => {
                tracing::trace!(error = %e, path = %path.display(), "ref path is a directory");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read ref {name}"));
            }
        };
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = compiled(&SYMREF)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(RefValue::Symbolic(RefName::try_parse(
                symref_match[1].to_string(),
            )?)))
        } else {
            let oid = ObjectId::try_parse(content.to_string())
                .map_err(|e| RepoError::corrupt(name, e.to_string()))?;
            Ok(Some(RefValue::Direct(oid)))
        }
    }

    /// Follow a symbolic chain to its terminal ref and that ref's value
    ///
    /// The value is `None` when the terminal ref does not exist yet.
    pub fn follow(&self, name: &RefName) -> anyhow::Result<(RefName, Option<ObjectId>)> {
        let mut current = name.clone();

        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read_raw(&current)? {
                Some(RefValue::Symbolic(target)) => current = target,
                Some(RefValue::Direct(oid)) => return Ok((current, Some(oid))),
                None => return Ok((current, None)),
            }
        }

        Err(RepoError::SymbolicLoop(name.to_string()).into())
    }

    /// Find the existing ref a possibly-short name refers to
    pub fn expand(&self, name: &str) -> Option<RefName> {
        SEARCH_PREFIXES
            .iter()
            .filter_map(|prefix| RefName::try_parse(format!("{prefix}{name}")).ok())
            .find(|candidate| self.ref_path(candidate).is_file())
    }

    /// Resolve a (possibly short, possibly symbolic) name to an object id
    pub fn resolve(&self, name: &str) -> anyhow::Result<ObjectId> {
        let full_name = self
            .expand(name)
            .ok_or_else(|| RepoError::UnknownRef(name.to_string()))?;

        match self.follow(&full_name)? {
            (_, Some(oid)) => Ok(oid),
            (terminal, None) => Err(RepoError::UnknownRef(terminal.to_string()).into()),
        }
    }

    /// Like [`Refs::resolve`] but `None` for names that do not exist
    pub fn try_resolve(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        match self.resolve(name) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if matches!(RepoError::find(&e), Some(RepoError::UnknownRef(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Compare-and-swap a ref
    ///
    /// `old_expected` of `None` means the ref must not exist yet. Symbolic refs
    /// are followed, so updating `HEAD` moves the checked-out branch. Fails
    /// with [`RepoError::Conflict`] when the current value differs.
    pub fn update(
        &self,
        name: &RefName,
        old_expected: Option<&ObjectId>,
        new: &ObjectId,
    ) -> anyhow::Result<()> {
        let (terminal, _) = self.follow(name)?;
        let mut lock = Lockfile::acquire_blocking(&self.ref_path(&terminal), self.lock_timeout)?;

        let current = match self.read_raw(&terminal)? {
            Some(RefValue::Direct(oid)) => Some(oid),
            Some(RefValue::Symbolic(_)) => {
                // retargeted between follow and lock
                return Err(self.conflict(&terminal, old_expected, "a symbolic ref"));
            }
            None => None,
        };

        if current.as_ref() != old_expected {
            let actual = current.map_or_else(|| "nothing".to_string(), |oid| oid.to_string());
            return Err(self.conflict(&terminal, old_expected, &actual));
        }

        lock.write(format!("{new}\n").as_bytes())?;
        lock.commit()?;

        tracing::debug!(reference = %terminal, old = ?old_expected.map(|oid| oid.to_short_oid()), new = %new.to_short_oid(), "updated ref");
        Ok(())
    }

    fn conflict(&self, name: &RefName, expected: Option<&ObjectId>, actual: &str) -> anyhow::Error {
        RepoError::Conflict {
            name: name.to_string(),
            expected: expected.map_or_else(|| "nothing".to_string(), |oid| oid.to_string()),
            actual: actual.to_string(),
        }
        .into()
    }

    /// Point `name` at another ref
    pub fn create_symbolic(&self, name: &RefName, target: &RefName) -> anyhow::Result<()> {
        let mut lock = Lockfile::acquire_blocking(&self.ref_path(name), self.lock_timeout)?;
        lock.write(format!("ref: {target}\n").as_bytes())?;
        lock.commit()
    }

    /// Make HEAD a detached pointer to `oid`
    pub fn detach_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        let mut lock = Lockfile::acquire_blocking(&self.head_path(), self.lock_timeout)?;
        lock.write(format!("{oid}\n").as_bytes())?;
        lock.commit()
    }

    pub fn head(&self) -> anyhow::Result<Head> {
        match self.read_raw(&RefName::head())? {
            Some(RefValue::Direct(oid)) => Ok(Head::Detached(oid)),
            Some(RefValue::Symbolic(_)) => Ok(Head::Branch(self.follow(&RefName::head())?.0)),
            None => Err(anyhow::anyhow!("HEAD is missing, not a repository?")),
        }
    }

    /// The commit HEAD designates; `None` on an unborn branch
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        Ok(self.follow(&RefName::head())?.1)
    }

    pub fn current_branch(&self) -> anyhow::Result<Option<BranchName>> {
        Ok(match self.head()? {
            Head::Branch(name) => name.branch_name(),
            Head::Detached(_) => None,
        })
    }

    /// Delete a ref; the checked-out branch is protected
    pub fn delete(&self, name: &RefName) -> anyhow::Result<ObjectId> {
        if let Head::Branch(current) = self.head()?
            && &current == name
        {
            return Err(RepoError::ProtectedRef(name.short_name().to_string()).into());
        }

        let path = self.ref_path(name);
        let lock = Lockfile::acquire_blocking(&path, self.lock_timeout)?;

        let oid = match self.read_raw(name)? {
            Some(RefValue::Direct(oid)) => oid,
            Some(RefValue::Symbolic(target)) => self
                .follow(&target)?
                .1
                .unwrap_or_else(ObjectId::zero),
            None => return Err(RepoError::UnknownRef(name.to_string()).into()),
        };

        lock.delete_target()
            .with_context(|| format!("failed to delete ref {name}"))?;
        self.prune_empty_parent_dirs(&path)?;

        tracing::debug!(reference = %name, "deleted ref");
        Ok(oid)
    }

    pub fn create_branch(&self, name: &BranchName, oid: &ObjectId) -> anyhow::Result<()> {
        let ref_name = RefName::branch(name);
        if self.ref_path(&ref_name).exists() {
            anyhow::bail!("a branch named '{name}' already exists");
        }
        self.update(&ref_name, None, oid)
    }

    /// Rename a branch, carrying HEAD along when it is checked out
    pub fn rename_branch(&self, old: &BranchName, new: &BranchName) -> anyhow::Result<()> {
        let old_ref = RefName::branch(old);
        let new_ref = RefName::branch(new);
        let oid = self.resolve(old_ref.as_str())?;

        if self.ref_path(&new_ref).exists() {
            anyhow::bail!("a branch named '{new}' already exists");
        }
        self.update(&new_ref, None, &oid)?;

        let was_current = self.head()? == Head::Branch(old_ref.clone());
        if was_current {
            self.create_symbolic(&RefName::head(), &new_ref)?;
        }
        self.delete(&old_ref)?;
        Ok(())
    }

    /// Every direct ref under `prefix`, sorted by name
    pub fn list(&self, prefix: &str) -> anyhow::Result<Vec<(RefName, ObjectId)>> {
        let refs_root = self.path.join("refs");
        let mut refs = BTreeMap::new();

        for entry in WalkDir::new(&refs_root).into_iter().filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_file() || entry.path().extension().is_some_and(|e| e == "lock")
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(self.path.as_ref()) else {
                continue;
            };
            let Ok(name) = RefName::try_parse(relative.to_string_lossy().replace('\\', "/")) else {
                continue;
            };
            if !name.as_str().starts_with(prefix) {
                continue;
            }
            if let (_, Some(oid)) = self.follow(&name)? {
                refs.insert(name, oid);
            }
        }

        Ok(refs.into_iter().collect())
    }

    /// Object id to the refs pointing at it, for log decorations
    pub fn reverse_refs(&self) -> anyhow::Result<HashMap<ObjectId, Vec<RefName>>> {
        let mut reverse = self.list("refs/")?.into_iter().fold(
            HashMap::<ObjectId, Vec<RefName>>::new(),
            |mut acc, (name, oid)| {
                acc.entry(oid).or_default().push(name);
                acc
            },
        );
        if let Some(oid) = self.read_head()? {
            reverse.entry(oid).or_default().insert(0, RefName::head());
        }
        Ok(reverse)
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        let refs_root = self.path.join("refs");
        let mut current = path.parent();

        while let Some(parent) = current {
            if parent == refs_root
                || parent == self.heads_path().as_path()
                || !parent.starts_with(&refs_root)
                || parent.read_dir()?.next().is_some()
            {
                break;
            }
            std::fs::remove_dir(parent)
                .with_context(|| format!("failed to remove empty ref directory {}", parent.display()))?;
            current = parent.parent();
        }

        Ok(())
    }
}
