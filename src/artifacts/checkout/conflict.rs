use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

/// Why a checkout refused to touch a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictType {
    /// Local edits to a tracked file
    StaleFile,
    /// A directory with untracked files sits where a file must go
    StaleDirectory,
    /// An untracked file would be overwritten
    UntrackedOverwritten,
    /// An untracked file would be removed
    UntrackedRemoved,
}

impl ConflictType {
    pub fn classify(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if stat.is_some_and(|stat| stat.mode.is_tree()) {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ConflictType::StaleFile => "local changes would be overwritten",
            ConflictType::StaleDirectory => "directory holds untracked files",
            ConflictType::UntrackedOverwritten => "untracked file would be overwritten",
            ConflictType::UntrackedRemoved => "untracked file would be removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::EntryMode;
    use crate::artifacts::objects::object_id::ObjectId;

    #[test]
    fn tracked_path_is_always_stale() {
        let entry = IndexEntry::default();

        assert_eq!(ConflictType::classify(None, Some(&entry), None), ConflictType::StaleFile);
    }

    #[test]
    fn untracked_paths_split_on_what_checkout_wants() {
        let dir = EntryMetadata {
            mode: EntryMode::Directory,
            ..Default::default()
        };
        let target = DatabaseEntry::new(ObjectId::zero(), EntryMode::default());

        assert_eq!(
            ConflictType::classify(Some(&dir), None, Some(&target)),
            ConflictType::StaleDirectory
        );
        assert_eq!(
            ConflictType::classify(Some(&EntryMetadata::default()), None, Some(&target)),
            ConflictType::UntrackedOverwritten
        );
        assert_eq!(
            ConflictType::classify(Some(&EntryMetadata::default()), None, None),
            ConflictType::UntrackedRemoved
        );
    }
}
