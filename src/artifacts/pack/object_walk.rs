use crate::areas::database::{Database, RawObject};
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::HashSet;
use std::io::Cursor;

/// Enumerates objects one side has and the other lacks
///
/// Everything reachable from the `haves` is marked first; walking the `wants`
/// then stops at marked objects. Uses an explicit work list so deep
/// histories cannot exhaust the stack.
pub struct ObjectWalk<'d> {
    database: &'d Database,
    seen: HashSet<ObjectId>,
}

impl<'d> ObjectWalk<'d> {
    pub fn new(database: &'d Database) -> Self {
        ObjectWalk {
            database,
            seen: HashSet::new(),
        }
    }

    /// Mark what the peer already has; ids unknown here are ignored
    pub fn hide(&mut self, haves: &[ObjectId]) -> anyhow::Result<()> {
        let known = haves
            .iter()
            .filter(|oid| self.database.exists(oid))
            .cloned()
            .collect::<Vec<_>>();
        self.walk(known, |_| {})
    }

    /// Objects reachable from `wants` that were not hidden
    pub fn collect(&mut self, wants: &[ObjectId]) -> anyhow::Result<Vec<RawObject>> {
        let mut objects = Vec::new();
        self.walk(wants.to_vec(), |object| objects.push(object))?;
        tracing::debug!(objects = objects.len(), "enumerated objects to send");
        Ok(objects)
    }

    fn walk(
        &mut self,
        roots: Vec<ObjectId>,
        mut visit: impl FnMut(RawObject),
    ) -> anyhow::Result<()> {
        let mut pending = roots;

        while let Some(oid) = pending.pop() {
            if !self.seen.insert(oid.clone()) {
                continue;
            }

            let (object_type, body) = self.database.read(&oid)?;
            match ObjectBox::parse(object_type, Cursor::new(&body))? {
                ObjectBox::Commit(commit) => {
                    pending.extend(commit.parents().iter().cloned());
                    pending.push(commit.tree_oid().clone());
                }
                ObjectBox::Tree(tree) => {
                    pending.extend(tree.entries().map(|(_, entry)| entry.oid.clone()));
                }
                ObjectBox::Tag(tag) => pending.push(tag.target().clone()),
                ObjectBox::Blob(_) => {}
            }

            visit(RawObject::new(oid, object_type, body));
        }

        Ok(())
    }
}
