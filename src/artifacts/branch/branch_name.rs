use crate::artifacts::branch::{CompiledRegex, INVALID_BRANCH_NAME_REGEX, compiled};
use anyhow::Context;
use std::sync::LazyLock;

pub const HEAD_REF_NAME: &str = "HEAD";
pub const REFS_PREFIX: &str = "refs/";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";

static INVALID_NAME: CompiledRegex = LazyLock::new(|| regex::Regex::new(INVALID_BRANCH_NAME_REGEX));

/// Validate a short name (branch, tag, remote) against the ref naming rules
fn validate_short_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("name cannot be empty");
    }

    if compiled(&INVALID_NAME)?.is_match(name) {
        anyhow::bail!("invalid ref name: {name}");
    }
    Ok(())
}

/// A fully qualified ref name: `HEAD` or `refs/...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    pub fn try_parse(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        if name == HEAD_REF_NAME {
            return Ok(Self(name));
        }

        let rest = name
            .strip_prefix(REFS_PREFIX)
            .with_context(|| format!("ref name must be HEAD or start with refs/: {name}"))?;
        validate_short_name(rest)?;
        Ok(Self(name))
    }

    pub fn head() -> Self {
        Self(HEAD_REF_NAME.to_string())
    }

    pub fn branch(branch_name: &BranchName) -> Self {
        Self(format!("{HEADS_PREFIX}{branch_name}"))
    }

    pub fn tag(tag_name: &BranchName) -> Self {
        Self(format!("{TAGS_PREFIX}{tag_name}"))
    }

    pub fn remote(remote: &BranchName, branch_name: &BranchName) -> Self {
        Self(format!("{REMOTES_PREFIX}{remote}/{branch_name}"))
    }

    pub fn is_head(&self) -> bool {
        self.0 == HEAD_REF_NAME
    }

    /// The branch this ref names, when it lives under `refs/heads/`
    pub fn branch_name(&self) -> Option<BranchName> {
        self.0
            .strip_prefix(HEADS_PREFIX)
            .map(|name| BranchName(name.to_string()))
    }

    /// `refs/heads/main` -> `main`, `refs/remotes/origin/main` -> `origin/main`
    pub fn short_name(&self) -> &str {
        [HEADS_PREFIX, TAGS_PREFIX, REMOTES_PREFIX, REFS_PREFIX]
            .iter()
            .find_map(|prefix| self.0.strip_prefix(prefix))
            .unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A short name such as `main` or `feature/x`; also used for tags and remotes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        validate_short_name(&name)?;
        Ok(Self(name))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;

    proptest! {
        #[test]
        fn plain_and_hierarchical_names_are_valid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(BranchName::try_parse(prefix.clone()).is_ok());
            assert!(BranchName::try_parse(format!("{prefix}/{suffix}")).is_ok());
        }

        #[test]
        fn names_starting_with_dot_are_invalid(suffix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!(".{suffix}")).is_err());
        }

        #[test]
        fn names_ending_with_lock_are_invalid(prefix in "[a-zA-Z0-9_-]+") {
            assert!(BranchName::try_parse(format!("{prefix}.lock")).is_err());
        }

        #[test]
        fn names_with_double_dots_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+"
        ) {
            assert!(BranchName::try_parse(format!("{prefix}..{suffix}")).is_err());
        }

        #[test]
        fn names_with_special_chars_are_invalid(
            prefix in "[a-zA-Z0-9_-]+",
            suffix in "[a-zA-Z0-9_-]+",
            special_char in r"[\*:\?\[\\^~ ]"
        ) {
            assert!(BranchName::try_parse(format!("{prefix}{special_char}{suffix}")).is_err());
        }
    }

    #[test]
    fn empty_and_slash_bounded_names_are_invalid() {
        assert!(BranchName::try_parse("").is_err());
        assert!(BranchName::try_parse("/main").is_err());
        assert!(BranchName::try_parse("main/").is_err());
        assert!(BranchName::try_parse("a@{b}").is_err());
    }

    #[test]
    fn full_names_require_refs_prefix_or_head() {
        assert!(RefName::try_parse("HEAD").is_ok());
        assert!(RefName::try_parse("refs/heads/main").is_ok());
        assert!(RefName::try_parse("heads/main").is_err());
        assert!(RefName::try_parse("refs/heads/bad..name").is_err());
    }

    #[test]
    fn short_names_strip_the_namespace() {
        let main = BranchName::try_parse("main").unwrap();
        let origin = BranchName::try_parse("origin").unwrap();

        assert_eq!(RefName::branch(&main).short_name(), "main");
        assert_eq!(RefName::remote(&origin, &main).short_name(), "origin/main");
        assert_eq!(RefName::tag(&main).as_str(), "refs/tags/main");
        assert_eq!(RefName::branch(&main).branch_name(), Some(main));
    }
}
