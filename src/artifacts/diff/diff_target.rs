use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const NULL_PATH: &str = "/dev/null";

/// One side of a file diff
#[derive(Debug, Clone)]
pub struct DiffTarget {
    pub file: PathBuf,
    pub oid: ObjectId,
    /// `None` when the file does not exist on this side
    pub mode: Option<EntryMode>,
    pub data: Bytes,
}

impl DiffTarget {
    pub fn from_entry(
        file: &Path,
        entry: Option<&DatabaseEntry>,
        database: &Database,
    ) -> anyhow::Result<Self> {
        match entry {
            Some(entry) => Ok(Self {
                file: file.to_path_buf(),
                oid: entry.oid.clone(),
                mode: Some(entry.mode),
                data: database.parse_object_as_blob(&entry.oid)?.into_content(),
            }),
            None => Ok(Self::from_nothing(file)),
        }
    }

    pub fn from_index(file: &Path, index: &Index, database: &Database) -> anyhow::Result<Self> {
        let entry = index
            .entry_by_path(file)
            .map(|entry| DatabaseEntry::new(entry.oid.clone(), entry.mode()));
        Self::from_entry(file, entry.as_ref(), database)
    }

    pub fn from_workspace(file: &Path, workspace: &Workspace) -> anyhow::Result<Self> {
        let Some(stat) = workspace.stat_file(file)? else {
            return Ok(Self::from_nothing(file));
        };
        let blob = workspace.parse_blob(file)?;

        Ok(Self {
            file: file.to_path_buf(),
            oid: blob.object_id()?,
            mode: Some(stat.mode),
            data: blob.into_content(),
        })
    }

    pub fn from_nothing(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            oid: ObjectId::zero(),
            mode: None,
            data: Bytes::new(),
        }
    }

    pub fn is_same_as(&self, other: &DiffTarget) -> bool {
        self.oid == other.oid && self.mode == other.mode
    }

    /// `a/<file>` or `b/<file>`, `/dev/null` for a missing side
    pub fn diff_path(&self, side: &str) -> PathBuf {
        if self.mode.is_some() {
            Path::new(side).join(&self.file)
        } else {
            PathBuf::from(NULL_PATH)
        }
    }

    pub fn pretty_mode(&self) -> &'static str {
        self.mode.unwrap_or_default().as_str()
    }
}
