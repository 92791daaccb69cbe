//! Best common ancestor of two commits
//!
//! ## Algorithm
//!
//! Phase 1 walks both histories at once, newest commit first. Every commit
//! remembers which side reached it; a commit reached from both sides is a
//! common ancestor, and everything below it is marked stale so the walk
//! does not report ancestors of ancestors.
//!
//! Phase 2 drops redundant candidates: a common ancestor reachable from
//! another common ancestor is never best.
//!
//! Several best ancestors can survive (criss-cross merges). The newest one
//! wins, ties broken by the smaller object id, so the answer is the same
//! whichever argument comes first.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use bitflags::bitflags;
use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b00;
        const VISITED_FROM_SOURCE = 0b01;
        const VISITED_FROM_TARGET = 0b10;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (VisitState::VISITED_FROM_SOURCE, "SOURCE"),
            (VisitState::VISITED_FROM_TARGET, "TARGET"),
            (VisitState::STALE, "STALE"),
            (VisitState::RESULT, "RESULT"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>();

        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Finds best common ancestors over any commit source
///
/// The loader returns the parents and committer time of a commit. Loaded
/// commits are cached for the lifetime of the finder.
pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
    cache: RefCell<HashMap<ObjectId, SlimCommit>>,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self {
            commit_loader,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn load(&self, commit_id: &ObjectId) -> anyhow::Result<SlimCommit> {
        if let Some(commit) = self.cache.borrow().get(commit_id) {
            return Ok(commit.clone());
        }

        let commit = (self.commit_loader)(commit_id)?;
        self.cache
            .borrow_mut()
            .insert(commit_id.clone(), commit.clone());
        Ok(commit)
    }

    /// Common ancestors of `source` and any of `targets`, with the side
    /// flags of every commit the walk touched
    fn find_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_ids: &HashSet<&ObjectId>,
    ) -> anyhow::Result<HashMap<ObjectId, VisitState>> {
        if target_commit_ids.contains(source_commit_id) {
            return Ok(HashMap::from([(
                source_commit_id.clone(),
                VisitState::VISITED_FROM_BOTH | VisitState::RESULT,
            )]));
        }

        let mut states = HashMap::<ObjectId, VisitState>::new();
        let mut queue = BinaryHeap::new();

        states.insert(source_commit_id.clone(), VisitState::VISITED_FROM_SOURCE);
        queue.push(self.load(source_commit_id)?);
        for &target_commit_id in target_commit_ids {
            states.insert(target_commit_id.clone(), VisitState::VISITED_FROM_TARGET);
            queue.push(self.load(target_commit_id)?);
        }

        while let Some(commit) = queue.pop() {
            let current_state = states.get(&commit.oid).copied().unwrap_or(VisitState::NONE);
            tracing::trace!(commit = %commit.oid, state = ?current_state, "merge base step");

            if current_state.contains(VisitState::STALE) {
                continue;
            }

            let is_common_ancestor = current_state.contains(VisitState::VISITED_FROM_BOTH);
            if is_common_ancestor {
                states.insert(commit.oid.clone(), current_state | VisitState::RESULT);
            }

            for parent_id in &commit.parents {
                let parent_state = states.get(parent_id).copied().unwrap_or(VisitState::NONE);
                let mut new_state =
                    parent_state | (current_state & VisitState::VISITED_FROM_BOTH);
                if is_common_ancestor {
                    new_state |= VisitState::STALE;
                }

                if new_state != parent_state {
                    states.insert(parent_id.clone(), new_state);
                    queue.push(self.load(parent_id)?);
                }
            }
        }

        Ok(states)
    }

    /// Every best common ancestor, newest first
    pub fn find_best_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let common_ancestors = self
            .find_common_ancestors(source_commit_id, &HashSet::from([target_commit_id]))?
            .into_iter()
            .filter(|(_, state)| {
                state.contains(VisitState::RESULT) && !state.contains(VisitState::STALE)
            })
            .map(|(oid, _)| oid)
            .collect::<HashSet<_>>();

        let mut redundant = HashSet::<ObjectId>::new();
        for candidate in &common_ancestors {
            if redundant.contains(candidate) {
                continue;
            }

            let others = common_ancestors
                .iter()
                .filter(|other| *other != candidate && !redundant.contains(*other))
                .collect::<HashSet<_>>();
            if others.is_empty() {
                continue;
            }
            let states = self.find_common_ancestors(candidate, &others)?;

            if states
                .get(candidate)
                .is_some_and(|state| state.contains(VisitState::VISITED_FROM_TARGET))
            {
                redundant.insert(candidate.clone());
            }
            for other in others {
                if states
                    .get(other)
                    .is_some_and(|state| state.contains(VisitState::VISITED_FROM_SOURCE))
                {
                    redundant.insert(other.clone());
                }
            }
        }

        let mut best = common_ancestors
            .into_iter()
            .filter(|oid| !redundant.contains(oid))
            .map(|oid| self.load(&oid))
            .collect::<anyhow::Result<Vec<_>>>()?;
        best.sort_by(|a, b| b.cmp(a));

        tracing::debug!(
            source = %source_commit_id,
            target = %target_commit_id,
            candidates = best.len(),
            "found best common ancestors"
        );
        Ok(best.into_iter().map(|commit| commit.oid).collect())
    }

    /// The single best common ancestor, `None` for unrelated histories
    pub fn find_best_common_ancestor(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> anyhow::Result<Option<ObjectId>> {
        Ok(self
            .find_best_common_ancestors(source_commit_id, target_commit_id)?
            .into_iter()
            .next())
    }

    /// Is `ancestor` reachable from `descendant` (a commit is its own ancestor)
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        let mut seen = HashSet::from([descendant.clone()]);
        let mut pending = VecDeque::from([descendant.clone()]);

        while let Some(oid) = pending.pop_front() {
            if &oid == ancestor {
                return Ok(true);
            }

            for parent in self.load(&oid)?.parents {
                if seen.insert(parent.clone()) {
                    pending.push_back(parent);
                }
            }
        }

        Ok(false)
    }
}
