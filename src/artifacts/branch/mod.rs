//! Ref names and revision expressions

pub mod branch_name;
pub mod revision;

use regex::Regex;
use std::sync::LazyLock;

/// A pattern compiled on first use
pub(crate) type CompiledRegex = LazyLock<Result<Regex, regex::Error>>;

pub(crate) fn compiled(regex: &'static CompiledRegex) -> anyhow::Result<&'static Regex> {
    regex
        .as_ref()
        .map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))
}

/// Anything a ref name component may not contain or look like
pub const INVALID_BRANCH_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\.lock$|@\{|[\x00-\x20\*:\?\[\\~\^\x7f]";
pub const PARENT_REGEX: &str = r"^(.+)\^$";
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};
