use crate::artifacts::objects::commit::Commit;
use chrono::{DateTime, FixedOffset};

/// Independent conditions a logged commit must meet
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Case-insensitive substring of the author's name or email
    pub author: Option<String>,
    /// Committer date lower bound, inclusive
    pub since: Option<DateTime<FixedOffset>>,
    /// Committer date upper bound, inclusive
    pub until: Option<DateTime<FixedOffset>>,
    pub max_count: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, commit: &Commit) -> bool {
        let timestamp = commit.timestamp();

        let author_matches = self.author.as_ref().is_none_or(|needle| {
            let needle = needle.to_lowercase();
            let author = commit.author();
            author.name().to_lowercase().contains(&needle)
                || author.email().to_lowercase().contains(&needle)
        });

        author_matches
            && self.since.is_none_or(|since| timestamp >= since)
            && self.until.is_none_or(|until| timestamp <= until)
    }

    pub fn is_exhausted(&self, emitted: usize) -> bool {
        self.max_count.is_some_and(|max| emitted >= max)
    }
}
