//! Index (staging area)
//!
//! The index tracks what the next commit will contain: one entry per staged
//! file with its blob id, mode and stat metadata.
//!
//! ## Index File Format
//!
//! - Header: signature, version and entry count
//! - Entries: sorted by path, 8-byte aligned
//! - Checksum: SHA-1 of everything before it
//!
//! The file is rewritten through `index.lock` and renamed into place, so a
//! concurrent reader sees either the old or the new index.
//!
//! ## Data Structures
//!
//! - `entries`: tracked files by path
//! - `children`: directory path to every tracked file below it, so staging a
//!   file can evict a same-named directory (and vice versa)

use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::error::RepoError;
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (`.gitc/index`)
    path: Box<Path>,
    entries: BTreeMap<PathBuf, IndexEntry>,
    children: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    lock_timeout: Duration,
    /// Modified since the last load or write
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>, lock_timeout: Duration) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            lock_timeout,
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.changed = false;
    }

    /// Reload the index from disk; a missing file is an empty index
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();

        let file = match std::fs::File::open(self.path()) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).context("unable to open index"),
        };
        if file.metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(BufReader::new(file));
        let corrupt = |e: anyhow::Error| RepoError::corrupt("index", e.to_string());

        let header = IndexHeader::deserialize(&reader.read(HEADER_SIZE).map_err(corrupt)?)
            .map_err(corrupt)?;
        self.parse_entries(header.entries_count, &mut reader)
            .map_err(corrupt)?;
        reader.verify().map_err(corrupt)?;

        tracing::trace!(entries = self.entries.len(), "loaded index");
        Ok(())
    }

    fn parse_entries<R: std::io::Read>(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<R>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(std::io::Cursor::new(entry_bytes))?;
            self.store_entry(entry);
        }

        Ok(())
    }

    /// Is `path` a tracked file or a directory containing tracked files
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }

    /// Remove entries that would clash with `entry`: files where it needs a
    /// directory, and everything below it when it replaces a directory
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(entry.name.clone());
        }

        self.entries.insert(entry.name.clone(), entry);
    }

    fn remove_children(&mut self, path: &Path) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path: &Path) {
        if let Some(entry) = self.entries.remove(path) {
            for parent in entry.parent_dirs() {
                if let Some(children) = self.children.get_mut(parent) {
                    children.remove(path);
                    if children.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
        }
    }

    pub fn add(&mut self, entry: IndexEntry) {
        self.discard_conflicts(&entry);
        self.store_entry(entry);
        self.changed = true;
    }

    /// Untrack a file or every file below a directory
    pub fn remove(&mut self, path: &Path) {
        self.remove_entry(path);
        self.remove_children(path);
        self.changed = true;
    }

    /// Replace the whole content with the files of a tree
    pub fn reset_to(&mut self, files: &BTreeMap<PathBuf, DatabaseEntry>) {
        self.clear();
        for (path, entry) in files {
            self.store_entry(IndexEntry::new(
                path.clone(),
                entry.oid.clone(),
                EntryMetadata {
                    mode: entry.mode,
                    ..Default::default()
                },
            ));
        }
        self.changed = true;
    }

    /// Persist through `index.lock`
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let lock = Lockfile::acquire_blocking(self.path(), self.lock_timeout)?;
        let mut writer = Checksum::new(lock);

        let header = IndexHeader::for_entries(self.entries.len() as u32);
        writer.write(&header.serialize()?)?;

        for entry in self.entries() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        writer.into_inner().commit()?;
        self.changed = false;

        tracing::debug!(entries = self.entries.len(), "wrote index");
        Ok(())
    }

    pub fn update_entry_stat(&mut self, path: &Path, stat: EntryMetadata) {
        if let Some(existing_entry) = self.entries.get_mut(path) {
            existing_entry.metadata = stat;
            self.changed = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Staged content as `path -> (oid, mode)`
    pub fn database_entries(&self) -> BTreeMap<PathBuf, DatabaseEntry> {
        self.entries
            .values()
            .map(|entry| {
                (
                    entry.name.clone(),
                    DatabaseEntry::new(entry.oid.clone(), entry.metadata.mode),
                )
            })
            .collect()
    }

    /// Tracked paths equal to or below `path`; `.` or empty selects everything
    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        let everything = path == Path::new(".") || path.as_os_str().is_empty();

        self.entries
            .keys()
            .filter(|entry_path| everything || entry_path.starts_with(path))
            .cloned()
            .collect()
    }
}
