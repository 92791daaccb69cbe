use crate::areas::repository::{DEFAULT_LOCK_TIMEOUT, Repository};
use crate::areas::workspace::REPOSITORY_DIR;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use anyhow::Context;
use std::fs;
use std::path::Path;

pub const DEFAULT_BRANCH: &str = "main";

impl Repository {
    /// Create (or reinitialize) a repository whose working tree is `path`
    ///
    /// Reinitializing keeps existing objects, refs and HEAD.
    pub fn init(path: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let path = path.canonicalize()?;
        let git_dir = path.join(REPOSITORY_DIR);

        for dir in ["objects", "refs/heads", "refs/tags", "refs/remotes"] {
            fs::create_dir_all(git_dir.join(dir))
                .with_context(|| format!("failed to create {REPOSITORY_DIR}/{dir}"))?;
        }

        let repository = Self::at(path, DEFAULT_LOCK_TIMEOUT);

        if !repository.refs().head_path().exists() {
            let default_branch = RefName::branch(&BranchName::try_parse(DEFAULT_BRANCH)?);
            repository
                .refs()
                .create_symbolic(&RefName::head(), &default_branch)
                .context("failed to create the initial HEAD")?;
            tracing::info!(path = %repository.path().display(), "initialized repository");
        } else {
            tracing::info!(path = %repository.path().display(), "reinitialized repository");
        }

        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::refs::Head;
    use assert_fs::TempDir;

    #[test]
    fn init_points_head_at_unborn_main() {
        let dir = TempDir::new().unwrap();

        let repository = Repository::init(dir.path()).unwrap();

        assert_eq!(
            repository.refs().head().unwrap(),
            Head::Branch(RefName::try_parse("refs/heads/main").unwrap())
        );
        assert_eq!(repository.refs().read_head().unwrap(), None);
        assert!(dir.path().join(".gitc/objects").is_dir());
    }

    #[test]
    fn reinit_keeps_head() {
        let dir = TempDir::new().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        repository
            .refs()
            .create_symbolic(
                &RefName::head(),
                &RefName::try_parse("refs/heads/other").unwrap(),
            )
            .unwrap();

        let repository = Repository::init(dir.path()).unwrap();

        assert_eq!(
            repository.refs().current_branch().unwrap().unwrap().to_string(),
            "other"
        );
    }
}
