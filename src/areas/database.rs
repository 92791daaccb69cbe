//! Content-addressable object store
//!
//! Objects live under `.gitc/objects/xx/yyyy…` as zlib-compressed canonical
//! serializations. Writes are idempotent and atomic (temp file + rename), and
//! every read re-hashes the content so a damaged file surfaces as
//! [`RepoError::Corrupt`] instead of wrong data.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::database::tree_walk::{TreeWalk, WalkItem};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable, canonical_bytes};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::error::RepoError;
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// An object as it travels in a pack: claimed id, kind and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub oid: ObjectId,
    pub object_type: ObjectType,
    pub body: Bytes,
}

impl RawObject {
    pub fn new(oid: ObjectId, object_type: ObjectType, body: Bytes) -> Self {
        RawObject {
            oid,
            object_type,
            body,
        }
    }

    /// Check the claimed id against the content and that the body parses
    pub fn verify(&self) -> anyhow::Result<ObjectBox> {
        let actual = ObjectId::hash_of(&canonical_bytes(self.object_type, &self.body));
        if actual != self.oid {
            return Err(RepoError::corrupt(
                &self.oid,
                format!("content hashes to {actual}"),
            )
            .into());
        }

        ObjectBox::parse(self.object_type, Cursor::new(&self.body))
            .map_err(|e| RepoError::corrupt(&self.oid, e.to_string()).into())
    }
}

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, object_id: &ObjectId) -> PathBuf {
        self.path.join(object_id.to_path())
    }

    pub fn exists(&self, object_id: &ObjectId) -> bool {
        self.object_path(object_id).is_file()
    }

    /// Store an object body of the given kind, returning its id
    ///
    /// Writing content that is already present is a no-op.
    pub fn write(&self, object_type: ObjectType, body: &[u8]) -> anyhow::Result<ObjectId> {
        let canonical = canonical_bytes(object_type, body);
        let object_id = ObjectId::hash_of(&canonical);
        self.write_canonical(&object_id, canonical)?;
        Ok(object_id)
    }

    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let canonical = object.canonical()?;
        let object_id = ObjectId::hash_of(&canonical);
        self.write_canonical(&object_id, canonical)?;
        Ok(object_id)
    }

    /// Store a commit once its tree and parents are known to exist
    pub fn store_commit(&self, commit: &Commit) -> anyhow::Result<ObjectId> {
        for required in std::iter::once(commit.tree_oid()).chain(commit.parents()) {
            if !self.exists(required) {
                return Err(RepoError::NotFound(required.clone()).into());
            }
        }
        self.store(commit)
    }

    /// Returns true when a new file was created
    fn write_canonical(&self, object_id: &ObjectId, canonical: Bytes) -> anyhow::Result<bool> {
        let object_path = self.object_path(object_id);
        if object_path.exists() {
            return Ok(false);
        }

        let object_dir = object_path
            .parent()
            .with_context(|| format!("invalid object path {}", object_path.display()))?;
        std::fs::create_dir_all(object_dir).with_context(|| {
            format!("unable to create object directory {}", object_dir.display())
        })?;

        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let compressed = Self::compress(&canonical)?;

        let result = (|| -> anyhow::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_object_path)
                .with_context(|| {
                    format!("unable to open object file {}", temp_object_path.display())
                })?;
            file.write_all(&compressed)?;
            file.sync_all()?;

            // rename to make the object appear atomically
            std::fs::rename(&temp_object_path, &object_path).with_context(|| {
                format!("unable to rename object file to {}", object_path.display())
            })
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_object_path);
        }
        result?;

        tracing::trace!(oid = %object_id, "stored object");
        Ok(true)
    }

    /// Read and verify an object, returning its kind and body
    pub fn read(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let object_path = self.object_path(object_id);
        let compressed = match std::fs::read(&object_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::NotFound(object_id.clone()).into());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("unable to read object file {}", object_path.display())
                });
            }
        };

        let canonical = Self::decompress(&compressed)
            .map_err(|e| RepoError::corrupt(object_id, e.to_string()))?;

        if ObjectId::hash_of(&canonical) != *object_id {
            return Err(RepoError::corrupt(object_id, "content does not match its id").into());
        }

        let mut reader = Cursor::new(&canonical);
        let (object_type, size) = ObjectType::parse_header(&mut reader)
            .map_err(|e| RepoError::corrupt(object_id, e.to_string()))?;
        let body = canonical.slice(reader.position() as usize..);
        if body.len() != size {
            return Err(RepoError::corrupt(
                object_id,
                format!("header declares {size} bytes, found {}", body.len()),
            )
            .into());
        }

        Ok((object_type, body))
    }

    pub fn object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        Ok(self.read(object_id)?.0)
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, body) = self.read(object_id)?;
        ObjectBox::parse(object_type, Cursor::new(body))
            .map_err(|e| RepoError::corrupt(object_id, e.to_string()).into())
    }

    fn parse_as<T: Unpackable>(
        &self,
        object_id: &ObjectId,
        expected: ObjectType,
    ) -> anyhow::Result<T> {
        let (object_type, body) = self.read(object_id)?;
        if object_type != expected {
            anyhow::bail!("object {object_id} is a {object_type}, not a {expected}");
        }
        T::deserialize(Cursor::new(body))
            .map_err(|e| RepoError::corrupt(object_id, e.to_string()).into())
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Blob> {
        self.parse_as(object_id, ObjectType::Blob)
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Tree> {
        self.parse_as(object_id, ObjectType::Tree)
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Commit> {
        self.parse_as(object_id, ObjectType::Commit)
    }

    pub fn parse_object_as_tag(&self, object_id: &ObjectId) -> anyhow::Result<Tag> {
        self.parse_as(object_id, ObjectType::Tag)
    }

    pub fn load_slim_commit(&self, object_id: &ObjectId) -> anyhow::Result<SlimCommit> {
        Ok(self
            .parse_object_as_commit(object_id)?
            .to_slim(object_id.clone()))
    }

    /// Peel tags until reaching a commit
    pub fn peel_to_commit(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let mut current = object_id.clone();
        loop {
            match self.object_type(&current)? {
                ObjectType::Commit => return Ok(current),
                ObjectType::Tag => current = self.parse_object_as_tag(&current)?.target().clone(),
                other => anyhow::bail!("object {object_id} is a {other}, not a commit"),
            }
        }
    }

    /// Resolve a commit, tag or tree id to the tree it designates
    pub fn peel_to_tree(&self, object_id: &ObjectId) -> anyhow::Result<ObjectId> {
        let mut current = object_id.clone();
        loop {
            match self.object_type(&current)? {
                ObjectType::Tree => return Ok(current),
                ObjectType::Commit => {
                    return Ok(self.parse_object_as_commit(&current)?.tree_oid().clone());
                }
                ObjectType::Tag => current = self.parse_object_as_tag(&current)?.target().clone(),
                ObjectType::Blob => anyhow::bail!("object {object_id} is a blob, not a tree"),
            }
        }
    }

    /// Lazily walk every entry reachable from a tree, depth first
    pub fn walk_tree(&self, tree_oid: &ObjectId) -> TreeWalk<'_> {
        TreeWalk::new(self, tree_oid.clone())
    }

    /// Every file (blob entry) reachable from a tree, keyed by path
    pub fn tree_files(
        &self,
        tree_oid: Option<&ObjectId>,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let Some(tree_oid) = tree_oid else {
            return Ok(BTreeMap::new());
        };

        self.walk_tree(tree_oid)
            .filter(|item| !matches!(item, Ok(WalkItem { object_type: ObjectType::Tree, .. })))
            .map(|item| item.map(|item| (item.path, DatabaseEntry::new(item.oid, item.mode))))
            .collect()
    }

    /// Verify and store a batch of objects, all or nothing
    ///
    /// Every object must hash to its claimed id and parse, and every tree or
    /// parent a commit or tree references must be in the batch or already in
    /// the store. If any write fails the objects created so far are removed.
    pub fn store_batch(&self, objects: &[RawObject]) -> anyhow::Result<BTreeSet<ObjectId>> {
        let in_batch = objects
            .iter()
            .map(|object| &object.oid)
            .collect::<HashSet<_>>();

        for object in objects {
            let parsed = object.verify()?;
            let referenced: Vec<ObjectId> = match parsed {
                ObjectBox::Commit(commit) => std::iter::once(commit.tree_oid())
                    .chain(commit.parents())
                    .cloned()
                    .collect(),
                ObjectBox::Tree(tree) => tree.entries().map(|(_, entry)| entry.oid.clone()).collect(),
                ObjectBox::Tag(tag) => vec![tag.target().clone()],
                ObjectBox::Blob(_) => Vec::new(),
            };

            if let Some(missing) = referenced
                .iter()
                .find(|oid| !in_batch.contains(oid) && !self.exists(oid))
            {
                return Err(RepoError::corrupt(
                    &object.oid,
                    format!("references missing object {missing}"),
                )
                .into());
            }
        }

        let mut created = Vec::new();
        for object in objects {
            let canonical = canonical_bytes(object.object_type, &object.body);
            match self.write_canonical(&object.oid, canonical) {
                Ok(true) => created.push(object.oid.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(created = created.len(), "rolling back partial object batch");
                    for oid in &created {
                        let _ = std::fs::remove_file(self.object_path(oid));
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(received = objects.len(), created = created.len(), "stored object batch");
        Ok(objects.iter().map(|object| object.oid.clone()).collect())
    }

    fn compress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .context("unable to compress object content")?;

        encoder
            .finish()
            .map(Bytes::from)
            .context("unable to finish compressing object content")
    }

    fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{:08x}", rand::random::<u32>())
    }

    /// Find every object whose id starts with `prefix`
    ///
    /// Only the matching fan-out directory is scanned for prefixes of two or
    /// more characters.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let directories = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255u8).map(|i| format!("{i:02x}")).collect()
        };

        let mut matches = Vec::new();
        for dir_name in directories {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let full_oid = format!("{dir_name}{}", file_name.to_string_lossy());

                if full_oid.starts_with(&prefix)
                    && let Ok(oid) = ObjectId::try_parse(full_oid)
                {
                    matches.push(oid);
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}
