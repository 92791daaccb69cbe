use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::RepoError;
use similar::{DiffTag, TextDiff};
use std::collections::HashMap;
use std::path::Path;

/// One line of a file with the commit that last changed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    /// 1-based
    pub number: usize,
    pub oid: ObjectId,
    pub author: Author,
    pub content: String,
}

/// Lines still looking for an owner: final line number to index in the version at hand
type Pending = Vec<(usize, usize)>;

impl Repository {
    /// Attribute each line of `path` as of `revision` to a commit
    ///
    /// History is followed along first parents. A line belongs to the first
    /// commit, walking back, whose parent does not have it. `lines` is a
    /// 1-based inclusive range; the end is clamped to the file's length.
    pub fn blame(&self, path: &Path, revision: &str, lines: Option<(usize, usize)>) -> anyhow::Result<Vec<BlameLine>> {
        let start = self.resolve_commit(revision)?;
        let mut commit = self.database().parse_object_as_commit(&start)?;
        let (mut blob, mut text) = self
            .file_at(&commit, path)?
            .ok_or_else(|| RepoError::PathNotFound(vec![path.to_path_buf()]))?;

        let final_lines = text.split_inclusive('\n').map(str::to_string).collect::<Vec<_>>();
        let (first, last) = match lines {
            Some((first, last)) if first == 0 || first > last => {
                anyhow::bail!("invalid line range {first},{last}")
            }
            Some((first, _)) if first > final_lines.len() => {
                anyhow::bail!("{} has only {} lines", path.display(), final_lines.len())
            }
            Some((first, last)) => (first, last.min(final_lines.len())),
            None => (1, final_lines.len()),
        };

        let mut owners: Vec<Option<ObjectId>> = vec![None; final_lines.len()];
        let mut pending: Pending = (first - 1..last).map(|line| (line, line)).collect();
        let mut current = start;

        while !pending.is_empty() {
            let parent_file = match commit.parent() {
                Some(parent) => {
                    let parent_commit = self.database().parse_object_as_commit(parent)?;
                    self.file_at(&parent_commit, path)?
                        .map(|file| (parent.clone(), parent_commit, file))
                }
                None => None,
            };
            let Some((parent, parent_commit, (parent_blob, parent_text))) = parent_file else {
                for (line, _) in pending.drain(..) {
                    owners[line] = Some(current.clone());
                }
                break;
            };

            if parent_blob != blob {
                let kept = carried_over(&parent_text, &text);
                pending.retain_mut(|(line, index)| match kept[*index] {
                    Some(old) => {
                        *index = old;
                        true
                    }
                    None => {
                        owners[*line] = Some(current.clone());
                        false
                    }
                });
            }

            current = parent;
            commit = parent_commit;
            blob = parent_blob;
            text = parent_text;
        }

        let mut authors: HashMap<ObjectId, Author> = HashMap::new();
        let mut blamed = Vec::with_capacity(last + 1 - first);
        for number in first..=last {
            let Some(oid) = owners[number - 1].clone() else {
                continue;
            };
            let author = match authors.get(&oid) {
                Some(author) => author.clone(),
                None => {
                    let author = self.database().parse_object_as_commit(&oid)?.author().clone();
                    authors.insert(oid.clone(), author.clone());
                    author
                }
            };
            blamed.push(BlameLine {
                number,
                oid,
                author,
                content: final_lines[number - 1].trim_end_matches(['\n', '\r']).to_string(),
            });
        }

        tracing::debug!(path = %path.display(), lines = blamed.len(), "blamed");
        Ok(blamed)
    }

    /// The blob id and text of `path` in a commit's tree
    fn file_at(&self, commit: &Commit, path: &Path) -> anyhow::Result<Option<(ObjectId, String)>> {
        let files = self.database().tree_files(Some(commit.tree_oid()))?;
        let Some(entry) = files.get(path) else {
            return Ok(None);
        };
        let blob = self.database().parse_object_as_blob(&entry.oid)?;
        let text = String::from_utf8(blob.content().to_vec())
            .map_err(|_| anyhow::anyhow!("{} is binary, cannot blame it", path.display()))?;

        Ok(Some((entry.oid.clone(), text)))
    }
}

/// For each line of `new`, its index in `old` when the diff leaves it untouched
fn carried_over(old: &str, new: &str) -> Vec<Option<usize>> {
    let diff = TextDiff::from_lines(old, new);
    let mut kept = vec![None; new.split_inclusive('\n').count()];
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            for (old_index, new_index) in old_range.zip(new_range) {
                kept[new_index] = Some(old_index);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::database::database_entry::DatabaseEntry;
    use crate::artifacts::index::entry_mode::EntryMode;
    use crate::artifacts::objects::object_type::ObjectType;
    use crate::artifacts::objects::tree::TreeBuilder;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn commit_file(repository: &Repository, parent: Option<&ObjectId>, name: &str, content: &str) -> ObjectId {
        let oid = repository.database().write(ObjectType::Blob, content.as_bytes()).unwrap();
        let entries = [(PathBuf::from("notes.txt"), DatabaseEntry::new(oid, EntryMode::from_executable(false)))];
        let builder = TreeBuilder::build(entries.iter().map(|(path, entry)| (path, entry.clone()))).unwrap();
        let root = builder
            .write_with(&mut |tree| repository.database().store(tree))
            .unwrap();
        let tree = repository.database().store(&root).unwrap();
        let author = Author::new_with_timestamp(
            name.into(),
            format!("{name}@example.com"),
            chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap().fixed_offset(),
        );
        repository
            .database()
            .store_commit(&Commit::new(parent.into_iter().cloned().collect(), tree, author, name.into()))
            .unwrap()
    }

    fn owners(lines: &[BlameLine]) -> Vec<(usize, &str, &str)> {
        lines
            .iter()
            .map(|line| (line.number, line.author.name(), line.content.as_str()))
            .collect()
    }

    #[test]
    fn each_line_goes_to_the_commit_that_introduced_it() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repository, None, "ana", "one\ntwo\nthree\n");
        let second = commit_file(&repository, Some(&first), "bob", "one\nTWO\nthree\n");
        let third = commit_file(&repository, Some(&second), "cy", "zero\none\nTWO\nthree\n");

        let blamed = repository
            .blame(Path::new("notes.txt"), &third.to_string(), None)
            .unwrap();

        assert_eq!(
            owners(&blamed),
            vec![(1, "cy", "zero"), (2, "ana", "one"), (3, "bob", "TWO"), (4, "ana", "three")]
        );
        assert_eq!(blamed[1].oid, first);
    }

    #[test]
    fn range_limits_the_output_and_clamps_its_end() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repository, None, "ana", "a\nb\n");
        let second = commit_file(&repository, Some(&first), "bob", "a\nb\nc\n");

        let blamed = repository
            .blame(Path::new("notes.txt"), &second.to_string(), Some((2, 10)))
            .unwrap();

        assert_eq!(owners(&blamed), vec![(2, "ana", "b"), (3, "bob", "c")]);
        assert!(
            repository
                .blame(Path::new("notes.txt"), &second.to_string(), Some((4, 5)))
                .is_err()
        );
    }

    #[test]
    fn unknown_path_is_reported() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let only = commit_file(&repository, None, "ana", "a\n");

        let err = repository
            .blame(Path::new("missing.txt"), &only.to_string(), None)
            .unwrap_err();

        assert!(matches!(RepoError::find(&err), Some(RepoError::PathNotFound(_))));
    }
}
