use crate::common::file::{FileSpec, write_file};
use assert_cmd::Command;
use assert_fs::TempDir;
use derive_new::new;
use gitc::areas::repository::Repository;
use rstest::fixture;
use std::path::Path;

pub const AUTHOR_DATE: &str = "2023-01-01 12:00:00 +0000";

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// A repository with one commit holding `1.txt`, `a/2.txt` and `a/b/3.txt`
#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_gitc_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    write_file(FileSpec::new(repository_dir.path().join("1.txt"), "one".to_string()));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("b").join("3.txt"),
        "three".to_string(),
    ));

    run_gitc_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();
    gitc_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success();

    repository_dir
}

pub fn run_gitc_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("gitc").expect("Failed to find gitc binary");
    cmd.current_dir(dir);
    cmd.envs([
        ("NO_COLOR", "1"),
        ("GITC_CONFIG_GLOBAL", "/nonexistent/gitc/config"),
    ]);
    cmd.env_remove("GITC_LOG");
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

#[derive(Debug, Clone, new)]
pub struct RandomAuthor {
    pub name: String,
    pub email: String,
}

pub fn generate_random_author() -> RandomAuthor {
    use fake::Fake;
    use fake::faker::internet::en::FreeEmail;
    use fake::faker::name::en::Name;

    let name = Name().fake::<String>().replace(' ', "_");
    let email = FreeEmail().fake::<String>();
    RandomAuthor::new(name, email)
}

pub fn gitc_commit(dir: &Path, message: &str) -> Command {
    let mut cmd = run_gitc_command(dir, &["commit", "-m", message]);
    cmd.envs([
        ("GIT_AUTHOR_NAME", "fake_user"),
        ("GIT_AUTHOR_EMAIL", "fake_email@email.com"),
        ("GIT_AUTHOR_DATE", AUTHOR_DATE),
    ]);
    cmd
}

/// Write `content` to `path`, stage it and commit; returns the new HEAD
pub fn commit_file(dir: &Path, path: &str, content: &str, message: &str) -> String {
    write_file(FileSpec::new(dir.join(path), content.to_string()));
    run_gitc_command(dir, &["add", path]).assert().success();
    gitc_commit(dir, message).assert().success();
    head_oid(dir)
}

pub fn head_oid(dir: &Path) -> String {
    resolve(dir, "HEAD")
}

pub fn resolve(dir: &Path, name: &str) -> String {
    Repository::open(dir)
        .expect("Failed to open repository")
        .refs()
        .resolve(name)
        .unwrap_or_else(|e| panic!("Failed to resolve {name}: {e}"))
        .to_string()
}

pub fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success();
    String::from_utf8(output.get_output().stdout.clone()).expect("stdout is not utf-8")
}
