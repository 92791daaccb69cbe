use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::{ANCESTOR_REGEX, CompiledRegex, PARENT_REGEX, REF_ALIASES, compiled};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::RepoError;
use anyhow::Context;
use std::fmt;
use std::sync::LazyLock;

const MIN_OID_PREFIX: usize = 4;

static PARENT: CompiledRegex = LazyLock::new(|| regex::Regex::new(PARENT_REGEX));
static ANCESTOR: CompiledRegex = LazyLock::new(|| regex::Regex::new(ANCESTOR_REGEX));

/// A revision expression naming a commit
///
/// - ref names, short or full: `main`, `v1.0`, `origin/main`, `HEAD`
/// - `@` as an alias for `HEAD`
/// - full or abbreviated (4+ hex digits) object ids, tried after refs
/// - `<rev>^` for the first parent and `<rev>~<n>` for the n-th ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Ref(BranchName),
    Ancestor(Box<Revision>, usize),
    Parent(Box<Revision>),
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Ref(name) => write!(f, "{name}"),
            Revision::Ancestor(base, generations) => write!(f, "{base}~{generations}"),
            Revision::Parent(base) => write!(f, "{base}^"),
        }
    }
}

impl Revision {
    pub fn try_parse(revision: &str) -> anyhow::Result<Revision> {
        if let Some(caps) = compiled(&PARENT)?.captures(revision) {
            let base_revision = Self::try_parse(&caps[1])?;
            Ok(Revision::Parent(Box::new(base_revision)))
        } else if let Some(caps) = compiled(&ANCESTOR)?.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            let base_revision = Self::try_parse(&caps[1])?;
            Ok(Revision::Ancestor(Box::new(base_revision), generations))
        } else {
            let resolved_name = *REF_ALIASES.get(revision).unwrap_or(&revision);
            Ok(Revision::Ref(BranchName::try_parse(resolved_name)?))
        }
    }

    /// The object the expression names, tags left unpeeled for plain refs
    pub fn resolve(&self, refs: &Refs, database: &Database) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => Self::resolve_name(name.as_ref(), refs, database),
            Revision::Parent(base) => Self::parent_of(base, 1, refs, database),
            Revision::Ancestor(base, generations) => {
                Self::parent_of(base, *generations, refs, database)
            }
        }
    }

    /// Like [`Revision::resolve`], peeling annotated tags down to a commit
    pub fn resolve_commit(&self, refs: &Refs, database: &Database) -> anyhow::Result<ObjectId> {
        database.peel_to_commit(&self.resolve(refs, database)?)
    }

    fn parent_of(
        base: &Revision,
        generations: usize,
        refs: &Refs,
        database: &Database,
    ) -> anyhow::Result<ObjectId> {
        let mut oid = base.resolve_commit(refs, database)?;
        for generation in 0..generations {
            oid = database
                .parse_object_as_commit(&oid)?
                .parent()
                .cloned()
                .ok_or_else(|| {
                    RepoError::UnknownRef(format!("{base}~{}", generation + 1))
                })?;
        }
        Ok(oid)
    }

    fn resolve_name(name: &str, refs: &Refs, database: &Database) -> anyhow::Result<ObjectId> {
        if let Some(oid) = refs.try_resolve(name)? {
            return Ok(oid);
        }
        if !Self::looks_like_oid(name) {
            return Err(RepoError::UnknownRef(name.to_string()).into());
        }

        let matches = database.find_objects_by_prefix(name)?;
        match matches.as_slice() {
            [] => Err(RepoError::UnknownRef(name.to_string()).into()),
            [oid] => Ok(oid.clone()),
            candidates => {
                let commits = candidates
                    .iter()
                    .filter(|oid| matches!(database.object_type(oid), Ok(ObjectType::Commit)))
                    .collect::<Vec<_>>();

                match commits.as_slice() {
                    [oid] => Ok((*oid).clone()),
                    _ => {
                        let hints = candidates
                            .iter()
                            .map(|oid| format!("\n  {}", oid.to_short_oid()))
                            .collect::<String>();
                        anyhow::bail!("short object id {name} is ambiguous, candidates are:{hints}")
                    }
                }
            }
        }
    }

    fn looks_like_oid(s: &str) -> bool {
        s.len() >= MIN_OID_PREFIX && s.len() <= 40 && s.chars().all(|c| c.is_ascii_hexdigit())
    }
}
