//! Lazy depth-first traversal of a tree
//!
//! The walk keeps an explicit stack of partially consumed trees rather than
//! recursing, so arbitrarily deep trees cannot overflow the call stack and
//! callers can stop early without loading the rest. Each step yields
//! `(path, kind, oid)` for the entry just visited; a subtree is yielded before
//! its contents.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::join_path;
use crate::error::RepoError;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkItem {
    pub path: PathBuf,
    pub object_type: ObjectType,
    pub oid: ObjectId,
    pub mode: EntryMode,
}

#[derive(Debug)]
struct Frame {
    path: PathBuf,
    oid: ObjectId,
    entries: std::vec::IntoIter<(String, DatabaseEntry)>,
}

#[derive(Debug)]
pub struct TreeWalk<'d> {
    database: &'d Database,
    root: ObjectId,
    stack: Vec<Frame>,
    /// Subtree yielded last, entered on the following step
    pending: Option<(PathBuf, ObjectId)>,
    started: bool,
    finished: bool,
}

impl<'d> TreeWalk<'d> {
    pub fn new(database: &'d Database, root: ObjectId) -> Self {
        TreeWalk {
            database,
            root,
            stack: Vec::new(),
            pending: None,
            started: false,
            finished: false,
        }
    }

    /// Start over from the root tree
    pub fn restart(&mut self) {
        self.stack.clear();
        self.pending = None;
        self.started = false;
        self.finished = false;
    }

    fn push_tree(&mut self, path: PathBuf, oid: ObjectId) -> anyhow::Result<()> {
        if self.stack.iter().any(|frame| frame.oid == oid) {
            return Err(RepoError::corrupt(&oid, "tree contains itself").into());
        }

        let tree = self.database.parse_object_as_tree(&oid)?;
        self.stack.push(Frame {
            path,
            oid,
            entries: tree.into_entries().collect::<Vec<_>>().into_iter(),
        });
        Ok(())
    }

    fn step(&mut self) -> anyhow::Result<Option<WalkItem>> {
        if !self.started {
            self.started = true;
            self.push_tree(PathBuf::new(), self.root.clone())?;
        }
        if let Some((path, oid)) = self.pending.take() {
            self.push_tree(path, oid)?;
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            let Some((name, entry)) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            let path = join_path(&frame.path, &name);
            let item = WalkItem {
                path: path.clone(),
                object_type: entry.mode.object_type(),
                oid: entry.oid.clone(),
                mode: entry.mode,
            };

            if entry.is_tree() {
                self.pending = Some((path, entry.oid));
            }

            return Ok(Some(item));
        }
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = anyhow::Result<WalkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
