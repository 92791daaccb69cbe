use colored::Colorize;

const LABEL_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WorkspaceChangeType {
    #[default]
    None,
    Untracked,
    Modified,
    Deleted,
}

impl From<&WorkspaceChangeType> for &str {
    fn from(change: &WorkspaceChangeType) -> Self {
        match change {
            WorkspaceChangeType::None => " ",
            WorkspaceChangeType::Untracked => "?",
            WorkspaceChangeType::Modified => "M",
            WorkspaceChangeType::Deleted => "D",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum IndexChangeType {
    #[default]
    None,
    Added,
    Modified,
    Deleted,
}

impl From<&IndexChangeType> for &str {
    fn from(change: &IndexChangeType) -> Self {
        match change {
            IndexChangeType::None => " ",
            IndexChangeType::Added => "A",
            IndexChangeType::Modified => "M",
            IndexChangeType::Deleted => "D",
        }
    }
}

/// The status buckets a path can fall into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusCategory {
    StagedNew,
    StagedModified,
    StagedDeleted,
    UnstagedModified,
    UnstagedDeleted,
    Untracked,
}

impl StatusCategory {
    pub fn is_staged(&self) -> bool {
        matches!(
            self,
            StatusCategory::StagedNew | StatusCategory::StagedModified | StatusCategory::StagedDeleted
        )
    }

    fn label(&self) -> &'static str {
        match self {
            StatusCategory::StagedNew => "new file:   ",
            StatusCategory::StagedModified | StatusCategory::UnstagedModified => "modified:   ",
            StatusCategory::StagedDeleted | StatusCategory::UnstagedDeleted => "deleted:    ",
            StatusCategory::Untracked => "",
        }
    }
}

impl std::fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = if self.is_staged() {
            self.label().green()
        } else {
            self.label().red()
        };
        write!(f, "{:>width$}{}", "", label, width = LABEL_WIDTH)
    }
}

/// Index and workspace change of one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileChange {
    pub index_change: IndexChangeType,
    pub workspace_change: WorkspaceChangeType,
}

impl FileChange {
    pub fn categories(&self) -> Vec<StatusCategory> {
        let staged = match self.index_change {
            IndexChangeType::None => None,
            IndexChangeType::Added => Some(StatusCategory::StagedNew),
            IndexChangeType::Modified => Some(StatusCategory::StagedModified),
            IndexChangeType::Deleted => Some(StatusCategory::StagedDeleted),
        };
        let unstaged = match self.workspace_change {
            WorkspaceChangeType::None => None,
            WorkspaceChangeType::Untracked => Some(StatusCategory::Untracked),
            WorkspaceChangeType::Modified => Some(StatusCategory::UnstagedModified),
            WorkspaceChangeType::Deleted => Some(StatusCategory::UnstagedDeleted),
        };

        staged.into_iter().chain(unstaged).collect()
    }
}

/// Two-letter porcelain code, e.g. `AM` or `??`
impl std::fmt::Display for FileChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.workspace_change == WorkspaceChangeType::Untracked {
            return write!(f, "??");
        }
        let index_str: &str = (&self.index_change).into();
        let workspace_str: &str = (&self.workspace_change).into();
        write!(f, "{index_str}{workspace_str}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_and_unstaged_changes_both_show_up() {
        let change = FileChange {
            index_change: IndexChangeType::Added,
            workspace_change: WorkspaceChangeType::Modified,
        };

        assert_eq!(
            change.categories(),
            vec![StatusCategory::StagedNew, StatusCategory::UnstagedModified]
        );
        assert_eq!(change.to_string(), "AM");
    }

    #[test]
    fn untracked_prints_question_marks() {
        let change = FileChange {
            workspace_change: WorkspaceChangeType::Untracked,
            ..Default::default()
        };

        assert_eq!(change.to_string(), "??");
    }
}
