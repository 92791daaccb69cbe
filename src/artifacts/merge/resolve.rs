//! Per-path three-way resolution
//!
//! For every path in base, ours or theirs: a side that did not move from the
//! base yields to the side that did, identical changes agree, and anything
//! else is a conflict carrying all three versions. A file on one side that
//! becomes a directory on the other also conflicts.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};

pub type FileMap = BTreeMap<PathBuf, DatabaseEntry>;

/// One path both sides changed differently; `None` means absent on that side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub path: PathBuf,
    pub base: Option<Bytes>,
    pub ours: Option<Bytes>,
    pub theirs: Option<Bytes>,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub merged: FileMap,
    pub conflicts: Vec<MergeConflict>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

pub struct Resolve<'d> {
    database: &'d Database,
}

impl<'d> Resolve<'d> {
    pub fn new(database: &'d Database) -> Self {
        Resolve { database }
    }

    pub fn execute(
        &self,
        base: &FileMap,
        ours: &FileMap,
        theirs: &FileMap,
    ) -> anyhow::Result<Resolution> {
        let paths = base
            .keys()
            .chain(ours.keys())
            .chain(theirs.keys())
            .collect::<BTreeSet<_>>();

        let mut resolution = Resolution::default();
        let mut conflicted = BTreeSet::new();

        for path in paths {
            let (base_entry, ours_entry, theirs_entry) =
                (base.get(path), ours.get(path), theirs.get(path));

            let picked = if ours_entry == theirs_entry || theirs_entry == base_entry {
                ours_entry
            } else if ours_entry == base_entry {
                theirs_entry
            } else {
                conflicted.insert(path.clone());
                continue;
            };

            if let Some(entry) = picked {
                resolution.merged.insert(path.clone(), entry.clone());
            }
        }

        for path in self.file_directory_clashes(&resolution.merged) {
            resolution.merged.remove(&path);
            conflicted.insert(path);
        }

        for path in conflicted {
            resolution.conflicts.push(MergeConflict {
                base: self.content(base.get(&path))?,
                ours: self.content(ours.get(&path))?,
                theirs: self.content(theirs.get(&path))?,
                path,
            });
        }

        tracing::debug!(
            merged = resolution.merged.len(),
            conflicts = resolution.conflicts.len(),
            "resolved three-way merge"
        );
        Ok(resolution)
    }

    /// Files whose path is also a directory of another merged file
    ///
    /// Paths order component-wise, so anything below `path` sorts right
    /// after it.
    fn file_directory_clashes(&self, merged: &FileMap) -> Vec<PathBuf> {
        merged
            .keys()
            .filter(|path| {
                merged
                    .range::<Path, _>((Bound::Excluded(path.as_path()), Bound::Unbounded))
                    .next()
                    .is_some_and(|(other, _)| other.starts_with(path))
            })
            .cloned()
            .collect()
    }

    fn content(&self, entry: Option<&DatabaseEntry>) -> anyhow::Result<Option<Bytes>> {
        entry
            .map(|entry| Ok(self.database.parse_object_as_blob(&entry.oid)?.into_content()))
            .transpose()
    }
}
