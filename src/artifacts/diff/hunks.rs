//! Line diffs between two blob contents

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Equal(String),
    Insert(String),
    Delete(String),
}

impl std::fmt::Display for Edit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edit::Equal(line) => write!(f, " {line}"),
            Edit::Insert(line) => write!(f, "{}", format!("+{line}").green()),
            Edit::Delete(line) => write!(f, "{}", format!("-{line}").red()),
        }
    }
}

/// A run of edits with up to three lines of context on each side
///
/// Starts are 1-based, as in a unified diff header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub a_start: usize,
    pub a_size: usize,
    pub b_start: usize,
    pub b_size: usize,
    pub edits: Vec<Edit>,
}

impl Hunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.a_start, self.a_size, self.b_start, self.b_size
        )
    }
}

/// `None` when either side is not valid UTF-8
pub fn diff_hunks(a: &[u8], b: &[u8]) -> Option<Vec<Hunk>> {
    let a = std::str::from_utf8(a).ok()?;
    let b = std::str::from_utf8(b).ok()?;
    let text_diff = TextDiff::from_lines(a, b);

    let hunks = text_diff
        .grouped_ops(CONTEXT_LINES)
        .iter()
        .filter_map(|group| {
            let first = group.first()?;
            let mut hunk = Hunk {
                a_start: first.old_range().start + 1,
                a_size: 0,
                b_start: first.new_range().start + 1,
                b_size: 0,
                edits: Vec::new(),
            };

            for op in group {
                for change in text_diff.iter_changes(op) {
                    let line = change.value().trim_end_matches('\n').to_string();
                    match change.tag() {
                        ChangeTag::Equal => {
                            hunk.a_size += 1;
                            hunk.b_size += 1;
                            hunk.edits.push(Edit::Equal(line));
                        }
                        ChangeTag::Delete => {
                            hunk.a_size += 1;
                            hunk.edits.push(Edit::Delete(line));
                        }
                        ChangeTag::Insert => {
                            hunk.b_size += 1;
                            hunk.edits.push(Edit::Insert(line));
                        }
                    }
                }
            }

            Some(hunk)
        })
        .collect();

    Some(hunks)
}
