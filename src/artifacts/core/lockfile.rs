//! Exclusive locks on repository files
//!
//! Locking `path` takes an exclusive `file_guard` lock on the anchor file
//! `path.lock`. The anchor is only a lock target and is left in place: the OS
//! drops the lock together with a process that dies, so a leftover anchor
//! never blocks anyone. New content goes to the hidden sibling `.<name>.new`
//! and is renamed over `path` on [`Lockfile::commit`], so readers see either
//! the old or the new content in full.
//!
//! Record locks belong to the whole process on some platforms, so the anchors
//! held by this process are also tracked in a process-wide set.

use crate::error::RepoError;
use anyhow::Context;
use file_guard::{FileGuard, Lock};
use std::collections::HashSet;
use std::fs::{File, Metadata};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

static HELD_ANCHORS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

fn held_anchors() -> MutexGuard<'static, HashSet<PathBuf>> {
    HELD_ANCHORS.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Lockfile {
    target: PathBuf,
    anchor: PathBuf,
    staging: PathBuf,
    guard: Option<FileGuard<Box<File>>>,
    pending: Option<File>,
}

impl std::fmt::Debug for Lockfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lockfile")
            .field("target", &self.target)
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

impl Lockfile {
    /// Try once; `Ok(None)` when someone else holds the lock
    pub fn try_acquire(target: &Path) -> anyhow::Result<Option<Self>> {
        let anchor = lock_path_for(target);
        if !held_anchors().insert(anchor.clone()) {
            return Ok(None);
        }

        let guard = match lock_anchor(&anchor) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                held_anchors().remove(&anchor);
                return Ok(None);
            }
            Err(e) => {
                held_anchors().remove(&anchor);
                return Err(e);
            }
        };

        Ok(Some(Lockfile {
            target: target.to_path_buf(),
            staging: staging_path_for(target),
            anchor,
            guard: Some(guard),
            pending: None,
        }))
    }

    /// Poll until the lock is ours or `timeout` passes, yielding between tries
    ///
    /// Use this for locks held across an await point, so the task holding
    /// the lock can run while we wait.
    pub async fn acquire(target: &Path, timeout: Duration) -> anyhow::Result<Self> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if let Some(lock) = Self::try_acquire(target)? {
                return Ok(lock);
            }
            if started.elapsed() >= timeout {
                return Err(timed_out(target, timeout));
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Poll until the lock is ours or `timeout` passes, sleeping the thread
    ///
    /// Only for locks released before their holder yields (a ref, the index,
    /// the config file): those are contended by other threads and processes,
    /// never by a task parked on this thread.
    pub fn acquire_blocking(target: &Path, timeout: Duration) -> anyhow::Result<Self> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if let Some(lock) = Self::try_acquire(target)? {
                return Ok(lock);
            }
            if started.elapsed() >= timeout {
                return Err(timed_out(target, timeout));
            }
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn pending_file(&mut self) -> std::io::Result<&mut File> {
        let file = match self.pending.take() {
            Some(file) => file,
            None => File::create(&self.staging)?,
        };
        Ok(self.pending.insert(file))
    }

    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let staging = self.staging.clone();
        self.pending_file()
            .and_then(|file| file.write_all(data))
            .with_context(|| format!("unable to write {}", staging.display()))
    }

    /// Atomically replace the target with what was written
    pub fn commit(mut self) -> anyhow::Result<()> {
        self.pending_file()?.sync_all()?;
        self.pending.take();
        std::fs::rename(&self.staging, &self.target).with_context(|| {
            format!("unable to move {} into place", self.staging.display())
        })
    }

    /// Release without touching the target
    pub fn rollback(self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Remove the target together with its anchor, then release
    pub fn delete_target(self) -> anyhow::Result<()> {
        std::fs::remove_file(&self.target)
            .with_context(|| format!("unable to delete {}", self.target.display()))?;
        if let Err(e) = std::fs::remove_file(&self.anchor) {
            tracing::debug!(anchor = %self.anchor.display(), error = %e, "lock anchor left behind");
        }
        Ok(())
    }
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending_file()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.pending.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if self.pending.take().is_some() {
            let _ = std::fs::remove_file(&self.staging);
        }
        // OS lock first, so nobody in this process re-locks the anchor under it
        self.guard.take();
        held_anchors().remove(&self.anchor);
    }
}

fn timed_out(target: &Path, timeout: Duration) -> anyhow::Error {
    tracing::warn!(lock = %lock_path_for(target).display(), "lock still held");
    RepoError::timeout(format!("locking {}", target.display()), timeout).into()
}

fn lock_anchor(anchor: &Path) -> anyhow::Result<Option<FileGuard<Box<File>>>> {
    if let Some(parent) = anchor.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(anchor)
        .with_context(|| format!("unable to open lock {}", anchor.display()))?;

    let guard = match file_guard::try_lock(Box::new(file), Lock::Exclusive, 0, 1) {
        Ok(guard) => guard,
        // POSIX reports a conflicting record lock as either EAGAIN or EACCES
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::PermissionDenied) => {
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("unable to lock {}", anchor.display())),
    };

    // the previous holder may have deleted the anchor we were waiting on
    match std::fs::metadata(anchor) {
        Ok(current) if same_file(&guard.metadata()?, &current) => Ok(Some(guard)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("unable to stat {}", anchor.display())),
    }
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_: &Metadata, _: &Metadata) -> bool {
    true
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut lock_path = target.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}

/// `.gitc/refs/heads/main` -> `.gitc/refs/heads/.main.new`; never a valid ref name
fn staging_path_for(target: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    if let Some(file_name) = target.file_name() {
        name.push(file_name);
    }
    name.push(".new");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("HEAD");

        let first = Lockfile::try_acquire(&target).unwrap();
        assert!(first.is_some());
        assert!(Lockfile::try_acquire(&target).unwrap().is_none());

        drop(first);
        assert!(Lockfile::try_acquire(&target).unwrap().is_some());
    }

    #[test]
    fn commit_replaces_target_and_releases() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("ref");
        std::fs::write(&target, "old").unwrap();

        let mut lock = Lockfile::try_acquire(&target).unwrap().unwrap();
        lock.write(b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        lock.commit().unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!staging_path_for(&target).exists());
        assert!(Lockfile::try_acquire(&target).unwrap().is_some());
    }

    #[test]
    fn dropping_an_uncommitted_lock_discards_the_write() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");
        std::fs::write(&target, "old").unwrap();

        let mut lock = Lockfile::try_acquire(&target).unwrap().unwrap();
        lock.write(b"half").unwrap();
        drop(lock);

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(!staging_path_for(&target).exists());
    }

    #[test]
    fn anchor_left_by_a_dead_holder_does_not_block() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("repository");
        std::fs::write(lock_path_for(&target), "").unwrap();

        let lock = Lockfile::acquire_blocking(&target, Duration::from_millis(30));

        assert!(lock.is_ok());
    }

    #[test]
    fn deleting_the_target_removes_the_anchor() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("topic");
        std::fs::write(&target, "oid").unwrap();

        Lockfile::try_acquire(&target).unwrap().unwrap().delete_target().unwrap();

        assert!(!target.exists());
        assert!(!lock_path_for(&target).exists());
        assert!(Lockfile::try_acquire(&target).unwrap().is_some());
    }

    #[test]
    fn acquire_times_out_with_typed_error() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");
        let _held = Lockfile::try_acquire(&target).unwrap().unwrap();

        let err = Lockfile::acquire_blocking(&target, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Timeout { .. })));
    }

    #[tokio::test]
    async fn waiting_yields_to_the_holder_on_the_same_thread() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("repository");
        let held = Lockfile::try_acquire(&target).unwrap().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });
        let started = Instant::now();
        let lock = Lockfile::acquire(&target, Duration::from_secs(5)).await;

        assert!(lock.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
