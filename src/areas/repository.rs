//! The repository handle
//!
//! A [`Repository`] is an explicit value bundling the stores of one working
//! tree. Several can be open in the same process; nothing is global. It is
//! `Send + Sync`: the index sits behind an async mutex and every other store
//! is stateless between calls.

use crate::areas::config::{Config, USER_EMAIL, USER_NAME};
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::{REPOSITORY_DIR, Workspace};
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::commit::{Author, SlimCommit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::status_info::Status;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const REPOSITORY_LOCK: &str = "repository";

/// Held while a mutating operation runs; released on drop
#[derive(Debug)]
pub struct RepositoryLock {
    _lock: Lockfile,
}

pub struct Repository {
    path: Box<Path>,
    git_dir: Box<Path>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
    lock_timeout: Duration,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open the repository whose working tree is exactly `path`
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("{} does not exist", path.display()))?;

        if !path.join(REPOSITORY_DIR).is_dir() {
            anyhow::bail!("not a gitc repository: {}", path.display());
        }

        Ok(Self::at(path, DEFAULT_LOCK_TIMEOUT))
    }

    /// Open the repository containing `start`, searching upwards
    pub fn discover(start: &Path) -> anyhow::Result<Self> {
        let start = start
            .canonicalize()
            .with_context(|| format!("{} does not exist", start.display()))?;

        start
            .ancestors()
            .find(|dir| dir.join(REPOSITORY_DIR).is_dir())
            .map(|dir| Self::at(dir.to_path_buf(), DEFAULT_LOCK_TIMEOUT))
            .with_context(|| {
                format!(
                    "not a gitc repository (or any parent up to /): {}",
                    start.display()
                )
            })
    }

    pub(crate) fn at(path: PathBuf, lock_timeout: Duration) -> Self {
        let git_dir = path.join(REPOSITORY_DIR);

        Repository {
            index: Arc::new(Mutex::new(Index::new(
                git_dir.join("index").into_boxed_path(),
                lock_timeout,
            ))),
            database: Database::new(git_dir.join("objects").into_boxed_path()),
            workspace: Workspace::new(path.clone().into_boxed_path()),
            refs: Refs::new(git_dir.clone().into_boxed_path(), lock_timeout),
            git_dir: git_dir.into_boxed_path(),
            path: path.into_boxed_path(),
            lock_timeout,
        }
    }

    /// How long mutating operations wait for locks held by someone else
    pub fn with_lock_timeout(self, lock_timeout: Duration) -> Self {
        Self::at(self.path.to_path_buf(), lock_timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn status_inspector(&self) -> Status<'_> {
        Status::new(&self.database, &self.workspace)
    }

    /// Configuration as currently on disk
    pub fn config(&self) -> anyhow::Result<Config> {
        Config::load(&self.git_dir.join("config"))
    }

    /// Take the repository-wide write lock, waiting up to the lock timeout
    pub async fn lock(&self) -> anyhow::Result<RepositoryLock> {
        let lock = Lockfile::acquire(&self.git_dir.join(REPOSITORY_LOCK), self.lock_timeout).await?;
        tracing::trace!(repository = %self.path.display(), "acquired repository lock");
        Ok(RepositoryLock { _lock: lock })
    }

    /// Resolve a revision (`main`, `HEAD~2`, an abbreviated id) to a commit
    pub fn resolve_commit(&self, revision: &str) -> anyhow::Result<ObjectId> {
        Revision::try_parse(revision)?.resolve_commit(&self.refs, &self.database)
    }

    pub fn bca_finder(&self) -> BCAFinder<impl Fn(&ObjectId) -> anyhow::Result<SlimCommit> + '_> {
        BCAFinder::new(|oid: &ObjectId| self.database.load_slim_commit(oid))
    }

    /// Author identity: `GIT_AUTHOR_*` first, then `user.name`/`user.email`
    pub fn author(&self) -> anyhow::Result<Author> {
        if let Some(author) = Author::load_from_env() {
            return Ok(author);
        }

        let config = self.config()?;
        match (config.get(USER_NAME), config.get(USER_EMAIL)) {
            (Some(name), Some(email)) => Ok(Author::new(name, email)),
            _ => anyhow::bail!(
                "author identity unknown, set {USER_NAME} and {USER_EMAIL} (gitc config {USER_NAME} \"Your Name\")"
            ),
        }
    }
}
