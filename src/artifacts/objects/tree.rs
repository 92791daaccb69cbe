//! Tree object
//!
//! Trees are directory snapshots: entries for files (blobs) and subdirectories
//! (other trees), keyed by name.
//!
//! ## Format
//!
//! Each entry: `<octal mode> <name>\0<20-byte raw id>`, entries sorted by name.
//! Parsing rejects unsorted or duplicate names, so a tree read back from the
//! store always satisfies the ordering invariant.
//!
//! ## Tree Building
//!
//! [`TreeBuilder`] turns a flat `path -> entry` listing (the index, or a merge
//! result) into nested trees. Subtrees are written before their parents since
//! a parent needs its children's ids.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, DatabaseEntry>,
}

impl Tree {
    pub fn new(entries: BTreeMap<String, DatabaseEntry>) -> anyhow::Result<Self> {
        for name in entries.keys() {
            validate_entry_name(name)?;
        }
        Ok(Tree { entries })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.entries.into_iter()
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn validate_entry_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        anyhow::bail!("invalid tree entry name {name:?}");
    }
    Ok(())
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();

        for (name, entry) in &self.entries {
            write!(content, "{:o} {}", entry.mode.as_u32(), name)?;
            content.push(0);
            entry.oid.write_raw_to(&mut content)?;
        }

        Ok(content.into())
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;
        let mut last_name: Option<String> = None;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                anyhow::bail!("unexpected EOF in tree entry mode");
            }
            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                anyhow::bail!("unexpected EOF in tree entry name");
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();
            validate_entry_name(&name)?;

            if let Some(last_name) = &last_name
                && last_name.as_str() >= name.as_str()
            {
                anyhow::bail!("tree entries out of order or duplicated at {name:?}");
            }

            let oid = ObjectId::read_raw_from(&mut reader)
                .context("unexpected EOF in tree entry object id")?;

            last_name = Some(name.clone());
            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|(name, entry)| {
                format!(
                    "{:0>6} {} {}\t{}",
                    entry.mode.as_str(),
                    entry.mode.object_type(),
                    entry.oid,
                    name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

/// Nested builder turning flat paths into trees
#[derive(Debug, Default)]
pub struct TreeBuilder {
    files: BTreeMap<String, DatabaseEntry>,
    directories: BTreeMap<String, TreeBuilder>,
}

impl TreeBuilder {
    pub fn build<P: AsRef<Path>>(
        entries: impl IntoIterator<Item = (P, DatabaseEntry)>,
    ) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for (path, entry) in entries {
            let components = split_path(path.as_ref())?;
            root.insert(&components, entry)
                .with_context(|| format!("cannot place {} in tree", path.as_ref().display()))?;
        }

        Ok(root)
    }

    fn insert(&mut self, components: &[String], entry: DatabaseEntry) -> anyhow::Result<()> {
        match components {
            [] => anyhow::bail!("empty path"),
            [name] => {
                if self.directories.contains_key(name) {
                    anyhow::bail!("{name} is both a file and a directory");
                }
                self.files.insert(name.clone(), entry);
                Ok(())
            }
            [directory, rest @ ..] => {
                if self.files.contains_key(directory) {
                    anyhow::bail!("{directory} is both a file and a directory");
                }
                self.directories
                    .entry(directory.clone())
                    .or_default()
                    .insert(rest, entry)
            }
        }
    }

    /// Write every subtree through `store` (children first) and return the root
    pub fn write_with<F>(&self, store: &mut F) -> anyhow::Result<Tree>
    where
        F: FnMut(&Tree) -> anyhow::Result<ObjectId>,
    {
        let mut entries = self.files.clone();

        for (name, directory) in &self.directories {
            let subtree = directory.write_with(store)?;
            let oid = store(&subtree)?;
            entries.insert(name.clone(), DatabaseEntry::new(oid, EntryMode::Directory));
        }

        Tree::new(entries)
    }
}

/// Split a repository-relative path into its normal components
pub fn split_path(path: &Path) -> anyhow::Result<Vec<String>> {
    path.components()
        .map(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("non UTF-8 path {}", path.display())),
            _ => Err(anyhow::anyhow!("path {} is not repository-relative", path.display())),
        })
        .collect()
}

/// Flatten a nested tree listing back into a path
pub fn join_path(parent: &Path, name: &str) -> PathBuf {
    if parent.as_os_str().is_empty() {
        PathBuf::from(name)
    } else {
        parent.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use std::io::Cursor;

    fn blob_entry(seed: &[u8]) -> DatabaseEntry {
        DatabaseEntry::new(
            ObjectId::hash_of(seed),
            EntryMode::File(FileMode::Regular),
        )
    }

    #[test]
    fn serialized_tree_parses_back_to_the_same_entries() {
        let tree = Tree::new(BTreeMap::from([
            ("a.txt".to_string(), blob_entry(b"a")),
            (
                "bin".to_string(),
                DatabaseEntry::new(ObjectId::hash_of(b"dir"), EntryMode::Directory),
            ),
        ]))
        .unwrap();

        let bytes = tree.serialize().unwrap();
        let parsed = Tree::deserialize(Cursor::new(bytes)).unwrap();

        assert_eq!(parsed, tree);
    }

    #[test]
    fn unsorted_entries_are_rejected() {
        let mut body = Vec::new();
        for name in ["b", "a"] {
            write!(body, "100644 {name}").unwrap();
            body.push(0);
            body.extend_from_slice(&ObjectId::hash_of(name.as_bytes()).to_raw().unwrap());
        }

        assert!(Tree::deserialize(Cursor::new(body)).is_err());
    }

    #[test]
    fn builder_nests_paths_and_writes_children_first() {
        let builder = TreeBuilder::build([
            (PathBuf::from("README.md"), blob_entry(b"readme")),
            (PathBuf::from("src/lib.rs"), blob_entry(b"lib")),
            (PathBuf::from("src/bin/main.rs"), blob_entry(b"main")),
        ])
        .unwrap();

        let mut written = Vec::new();
        let root = builder
            .write_with(&mut |tree: &Tree| {
                written.push(tree.len());
                tree.object_id()
            })
            .unwrap();

        // src/bin is written before src, the root is returned unwritten
        assert_eq!(written, vec![1, 2]);
        assert_eq!(root.len(), 2);
        assert!(root.get("src").unwrap().is_tree());
    }

    #[test]
    fn builder_rejects_file_directory_clash() {
        let result = TreeBuilder::build([
            (PathBuf::from("a"), blob_entry(b"1")),
            (PathBuf::from("a/b"), blob_entry(b"2")),
        ]);

        assert!(result.is_err());
    }
}
