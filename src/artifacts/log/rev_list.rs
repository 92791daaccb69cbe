use crate::areas::database::Database;
use crate::artifacts::log::log_filter::LogFilter;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Lazy walk of the history reachable from a set of commits
///
/// A commit comes out only after every descendant in the walk did; among
/// the commits ready at that point, the newest committer date goes first and
/// equal dates go by the smaller object id. Commits reachable from a hidden
/// commit are skipped, which gives `a..b` ranges.
///
/// The graph shape is read up front on the first step; full commits are
/// parsed one at a time as they are yielded.
pub struct RevList<'d> {
    database: &'d Database,
    starts: Vec<ObjectId>,
    /// Commits whose in-walk children were all yielded
    ready: BinaryHeap<SlimCommit>,
    /// Commits still waiting on children, with how many are left
    waiting: HashMap<ObjectId, (SlimCommit, usize)>,
    hidden: HashSet<ObjectId>,
    filter: LogFilter,
    prepared: bool,
    emitted: usize,
    failed: bool,
}

impl<'d> RevList<'d> {
    pub fn new(
        database: &'d Database,
        starts: impl IntoIterator<Item = ObjectId>,
        filter: LogFilter,
    ) -> anyhow::Result<Self> {
        let starts = starts.into_iter().collect::<Vec<_>>();
        for start in &starts {
            database.load_slim_commit(start)?;
        }

        Ok(RevList {
            database,
            starts,
            ready: BinaryHeap::new(),
            waiting: HashMap::new(),
            hidden: HashSet::new(),
            filter,
            prepared: false,
            emitted: 0,
            failed: false,
        })
    }

    /// Exclude every commit reachable from `oid`
    pub fn hide(mut self, oid: &ObjectId) -> anyhow::Result<Self> {
        let mut pending = vec![oid.clone()];
        while let Some(oid) = pending.pop() {
            if self.hidden.insert(oid.clone()) {
                pending.extend(self.database.load_slim_commit(&oid)?.parents);
            }
        }
        Ok(self)
    }

    /// Count the children of every visible commit; the childless ones are ready
    fn prepare(&mut self) -> anyhow::Result<()> {
        let mut commits = HashMap::new();
        let mut pending = self.starts.clone();
        while let Some(oid) = pending.pop() {
            if self.hidden.contains(&oid) || commits.contains_key(&oid) {
                continue;
            }
            let slim = self.database.load_slim_commit(&oid)?;
            pending.extend(slim.parents.iter().cloned());
            commits.insert(oid, slim);
        }

        let mut children = HashMap::<ObjectId, usize>::new();
        for slim in commits.values() {
            for parent in distinct_parents(slim) {
                if commits.contains_key(parent) {
                    *children.entry(parent.clone()).or_default() += 1;
                }
            }
        }

        for (oid, slim) in commits {
            match children.get(&oid) {
                Some(&count) => {
                    self.waiting.insert(oid, (slim, count));
                }
                None => self.ready.push(slim),
            }
        }
        self.prepared = true;
        Ok(())
    }

    fn release_parents(&mut self, slim: &SlimCommit) {
        for parent in distinct_parents(slim) {
            let Some((_, count)) = self.waiting.get_mut(parent) else {
                continue;
            };
            *count -= 1;
            if *count == 0
                && let Some((parent, _)) = self.waiting.remove(parent)
            {
                self.ready.push(parent);
            }
        }
    }

    fn step(&mut self) -> anyhow::Result<Option<(ObjectId, Commit)>> {
        if !self.prepared {
            self.prepare()?;
        }

        while let Some(slim) = self.ready.pop() {
            self.release_parents(&slim);

            let commit = self.database.parse_object_as_commit(&slim.oid)?;
            if self.filter.matches(&commit) {
                return Ok(Some((slim.oid, commit)));
            }
        }

        Ok(None)
    }
}

fn distinct_parents(slim: &SlimCommit) -> impl Iterator<Item = &ObjectId> {
    let mut seen = HashSet::new();
    slim.parents.iter().filter(move |parent| seen.insert(*parent))
}

impl Iterator for RevList<'_> {
    type Item = anyhow::Result<(ObjectId, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.filter.is_exhausted(self.emitted) {
            return None;
        }

        match self.step() {
            Ok(Some(entry)) => {
                self.emitted += 1;
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::tree::Tree;
    use assert_fs::TempDir;
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    struct History {
        _dir: TempDir,
        database: Database,
        tree: ObjectId,
    }

    impl History {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let database = Database::new(dir.path().join("objects").into_boxed_path());
            let tree = database.store(&Tree::new(BTreeMap::new()).unwrap()).unwrap();
            History { _dir: dir, database, tree }
        }

        fn commit(&self, message: &str, parents: &[&ObjectId], seconds: i64, author: &str) -> ObjectId {
            let timestamp = FixedOffset::east_opt(0).unwrap().timestamp_opt(seconds, 0).unwrap();
            let author =
                Author::new_with_timestamp(author.to_string(), format!("{author}@example.com"), timestamp);
            let commit = Commit::new(
                parents.iter().map(|p| (*p).clone()).collect(),
                self.tree.clone(),
                author,
                message.to_string(),
            );
            self.database.store_commit(&commit).unwrap()
        }

        fn messages(&self, rev_list: RevList<'_>) -> Vec<String> {
            rev_list
                .map(|entry| entry.unwrap().1.message().to_string())
                .collect()
        }
    }

    #[test]
    fn merge_history_comes_out_newest_first_once() {
        let history = History::new();
        let root = history.commit("root", &[], 100, "alice");
        let left = history.commit("left", &[&root], 200, "alice");
        let right = history.commit("right", &[&root], 300, "bob");
        let merge = history.commit("merge", &[&left, &right], 400, "alice");

        let rev_list = RevList::new(&history.database, [merge], LogFilter::default()).unwrap();

        assert_eq!(history.messages(rev_list), vec!["merge", "right", "left", "root"]);
    }

    #[test]
    fn filters_compose() {
        let history = History::new();
        let first = history.commit("first", &[], 100, "alice");
        let second = history.commit("second", &[&first], 200, "bob");
        let third = history.commit("third", &[&second], 300, "alice");
        let fourth = history.commit("fourth", &[&third], 400, "alice");

        let filter = LogFilter {
            author: Some("alice".to_string()),
            max_count: Some(2),
            ..Default::default()
        };
        let rev_list = RevList::new(&history.database, [fourth], filter).unwrap();

        assert_eq!(history.messages(rev_list), vec!["fourth", "third"]);
    }

    #[test]
    fn hidden_history_is_excluded() {
        let history = History::new();
        let base = history.commit("base", &[], 100, "alice");
        let tip = history.commit("tip", &[&base], 200, "alice");

        let rev_list = RevList::new(&history.database, [tip], LogFilter::default())
            .unwrap()
            .hide(&base)
            .unwrap();

        assert_eq!(history.messages(rev_list), vec!["tip"]);
    }

    #[test]
    fn descendants_come_first_when_dates_tie() {
        let history = History::new();
        let x = history.commit("x", &[], 100, "alice");
        let y = history.commit("y", &[&x], 100, "alice");
        let merge = history.commit("merge", &[&x, &y], 100, "alice");

        let rev_list = RevList::new(&history.database, [merge], LogFilter::default()).unwrap();

        assert_eq!(history.messages(rev_list), vec!["merge", "y", "x"]);
    }

    #[test]
    fn descendants_come_first_despite_clock_skew() {
        let history = History::new();
        let parent = history.commit("parent", &[], 500, "alice");
        let child = history.commit("child", &[&parent], 100, "alice");
        let other = history.commit("other", &[], 300, "alice");

        let rev_list = RevList::new(&history.database, [child, other], LogFilter::default()).unwrap();

        assert_eq!(history.messages(rev_list), vec!["other", "child", "parent"]);
    }

    #[test]
    fn equal_dates_order_by_object_id() {
        let history = History::new();
        let a = history.commit("a", &[], 100, "alice");
        let b = history.commit("b", &[], 100, "alice");

        let oids = RevList::new(&history.database, [a.clone(), b.clone()], LogFilter::default())
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect::<Vec<_>>();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(oids, expected);
    }
}
