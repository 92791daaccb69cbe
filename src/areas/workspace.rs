//! Working tree access
//!
//! All paths handed to and returned by [`Workspace`] are relative to the
//! repository root. The `.gitc` directory is never listed.

use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const REPOSITORY_DIR: &str = ".gitc";

const IGNORED_PATHS: [&str; 1] = [REPOSITORY_DIR];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.path.join(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.absolute(path).symlink_metadata().is_ok()
    }

    pub fn is_file(&self, path: &Path) -> bool {
        self.absolute(path).is_file()
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.absolute(path).is_dir()
    }

    /// Turn a user-supplied path (absolute, or relative to `cwd`) into a
    /// repository-relative one without touching the filesystem
    pub fn relative_path(&self, cwd: &Path, input: &Path) -> anyhow::Result<PathBuf> {
        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            cwd.join(input)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        normalized
            .strip_prefix(self.path.as_ref())
            .map(Path::to_path_buf)
            .with_context(|| format!("{} is outside the repository", input.display()))
    }

    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::new(self.read_file(path)?))
    }

    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let content = std::fs::read(self.absolute(file_path))
            .with_context(|| format!("unable to read {}", file_path.display()))?;

        Ok(content.into())
    }

    /// `None` when nothing exists at `file_path`
    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let absolute = self.absolute(file_path);
        match std::fs::metadata(&absolute) {
            Ok(metadata) => Ok(Some((absolute.as_path(), metadata).try_into()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            // a parent is a file
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(None),
            Err(e) => Err(e).with_context(|| format!("unable to stat {}", file_path.display())),
        }
    }

    /// Immediate children of a directory (the root when `None`)
    pub fn list_dir(&self, dir_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let absolute = dir_path.map_or_else(|| self.path.to_path_buf(), |p| self.absolute(p));

        let mut children = std::fs::read_dir(&absolute)
            .with_context(|| format!("unable to list {}", absolute.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.relative_if_not_ignored(&entry.path()))
            .collect::<Vec<_>>();
        children.sort();

        Ok(children)
    }

    /// Every file at or below `root` (the whole tree when `None`), sorted
    pub fn list_files(&self, root: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let absolute = root.map_or_else(|| self.path.to_path_buf(), |p| self.absolute(p));

        if absolute.is_file() {
            return Ok(self.relative_if_not_ignored(&absolute).into_iter().collect());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&absolute)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(self.path.as_ref())
                    .map_or(true, |relative| !Self::is_ignored(relative))
            });

        for entry in walker {
            let entry = entry.with_context(|| format!("unable to walk {}", absolute.display()))?;
            if entry.file_type().is_file()
                && let Some(path) = self.relative_if_not_ignored(entry.path())
            {
                files.push(path);
            }
        }

        Ok(files)
    }

    fn is_ignored(path: &Path) -> bool {
        path.components().any(|component| {
            matches!(component, Component::Normal(name) if IGNORED_PATHS.iter().any(|ignored| name == *ignored))
        })
    }

    fn relative_if_not_ignored(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(self.path.as_ref()).ok()?;
        if relative.as_os_str().is_empty() || Self::is_ignored(relative) {
            None
        } else {
            Some(relative.to_path_buf())
        }
    }

    /// Write a file, creating parent directories and applying its mode
    pub fn write_file(&self, file_path: &Path, data: &[u8], entry: &DatabaseEntry) -> anyhow::Result<()> {
        let path = self.absolute(file_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent of {}", file_path.display()))?;
        }
        if path.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove directory {}", file_path.display()))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", file_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("failed to write {}", file_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if entry.mode.as_u32() & 0o111 != 0 { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set permissions for {}", file_path.display()))?;
        }

        Ok(())
    }

    /// Remove a file, then any directories it leaves empty
    pub fn remove_file(&self, file_path: &Path) -> anyhow::Result<()> {
        let path = self.absolute(file_path);
        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(&path)?,
            Ok(_) => std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", file_path.display()))?,
            Err(_) => {}
        }

        for ancestor in file_path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            let dir = self.absolute(ancestor);
            // non-empty or already gone
            if std::fs::remove_dir(&dir).is_err() {
                break;
            }
        }

        Ok(())
    }

    fn make_directory(&self, dir_path: &Path) -> anyhow::Result<()> {
        let dir_path = self.absolute(dir_path);

        if dir_path.is_file() {
            std::fs::remove_file(&dir_path)?;
        }
        if !dir_path.is_dir() {
            std::fs::create_dir_all(&dir_path)?;
        }

        Ok(())
    }

    /// Apply a planned checkout
    ///
    /// Deletions first (files, then emptied directories deepest first), then
    /// directories are created parents first, then files are written.
    pub fn apply_migration(&self, migration: &Migration) -> anyhow::Result<()> {
        for (file_path, _) in migration.actions_of(ActionType::Delete) {
            self.remove_file(file_path)?;
        }

        for dir_path in migration.rmdirs().iter().rev() {
            let absolute = self.absolute(dir_path);
            if absolute.is_dir() && absolute.read_dir()?.next().is_none() {
                std::fs::remove_dir(&absolute)?;
            }
        }

        for dir_path in migration.mkdirs() {
            self.make_directory(dir_path)?;
        }

        for action in [ActionType::Modify, ActionType::Add] {
            for (file_path, entry) in migration.actions_of(action) {
                let entry = entry
                    .as_ref()
                    .with_context(|| format!("no target entry for {}", file_path.display()))?;
                let data = migration.load_blob_data(&entry.oid)?;
                self.write_file(file_path, &data, entry)?;
            }
        }

        Ok(())
    }
}
