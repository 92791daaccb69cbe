use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

use common::command::{commit_file, head_oid, init_repository_dir, resolve, run_gitc_command, stdout_of};
use common::file::{FileSpec, read_file, write_file};

#[rstest]
fn merging_a_descendant_fast_forwards(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    let feature = commit_file(dir, "feature.txt", "new work", "Feature work");
    run_gitc_command(dir, &["switch", "main"]).assert().success();

    run_gitc_command(dir, &["merge", "feature"])
        .assert()
        .success()
        .stdout(format!("Fast-forward to {}\n", &feature[..7]));

    assert_eq!(resolve(dir, "main"), feature);
    assert_eq!(read_file(&dir.join("feature.txt")), "new work");
    Ok(())
}

#[rstest]
fn no_ff_records_a_merge_commit(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    let base = head_oid(dir);
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    let feature = commit_file(dir, "feature.txt", "new work", "Feature work");
    run_gitc_command(dir, &["switch", "main"]).assert().success();

    run_gitc_command(dir, &["merge", "--no-ff", "feature", "-m", "Bring in feature"])
        .envs([("GIT_AUTHOR_NAME", "fake_user"), ("GIT_AUTHOR_EMAIL", "fake_email@email.com")])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Merge made commit"));

    let pretty = stdout_of(&mut run_gitc_command(dir, &["cat-file", "-p", "HEAD"]));
    assert!(pretty.contains(&format!("parent {base}")), "{pretty}");
    assert!(pretty.contains(&format!("parent {feature}")), "{pretty}");
    assert!(pretty.contains("Bring in feature"), "{pretty}");
    Ok(())
}

#[rstest]
fn diverged_branches_merge_cleanly_when_files_differ(
    init_repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    commit_file(dir, "a/2.txt", "two from feature", "Feature edits 2.txt");
    run_gitc_command(dir, &["switch", "main"]).assert().success();
    commit_file(dir, "1.txt", "one from main", "Main edits 1.txt");

    run_gitc_command(dir, &["merge", "feature"])
        .envs([("GIT_AUTHOR_NAME", "fake_user"), ("GIT_AUTHOR_EMAIL", "fake_email@email.com")])
        .assert()
        .success();

    assert_eq!(read_file(&dir.join("1.txt")), "one from main");
    assert_eq!(read_file(&dir.join("a/2.txt")), "two from feature");
    run_gitc_command(dir, &["status", "--porcelain"]).assert().success().stdout("");
    run_gitc_command(dir, &["log", "--oneline", "--no-decorate", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Merge feature into main"));
    Ok(())
}

#[rstest]
fn conflicting_edits_change_nothing(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    commit_file(dir, "1.txt", "feature line", "Feature edits line 1");
    run_gitc_command(dir, &["switch", "main"]).assert().success();
    let main = commit_file(dir, "1.txt", "main line", "Main edits line 1");

    run_gitc_command(dir, &["merge", "feature"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("CONFLICT (content): 1.txt"))
        .stdout(predicate::str::contains("nothing was changed"));

    assert_eq!(head_oid(dir), main);
    assert_eq!(read_file(&dir.join("1.txt")), "main line");
    run_gitc_command(dir, &["status", "--porcelain"]).assert().success().stdout("");
    Ok(())
}

#[rstest]
fn merging_an_ancestor_is_already_up_to_date(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    let first = head_oid(dir);
    commit_file(dir, "x.txt", "x", "Second");

    run_gitc_command(dir, &["merge", &first])
        .assert()
        .success()
        .stdout("Already up to date.\n");
    Ok(())
}

#[rstest]
fn merge_base_is_the_fork_point(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    let fork = head_oid(dir);
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    commit_file(dir, "f.txt", "f", "Feature");
    run_gitc_command(dir, &["switch", "main"]).assert().success();
    commit_file(dir, "m.txt", "m", "Main");

    let forward = stdout_of(&mut run_gitc_command(dir, &["merge-base", "main", "feature"]));
    let backward = stdout_of(&mut run_gitc_command(dir, &["merge-base", "feature", "main"]));

    assert_eq!(forward, format!("{fork}\n"));
    assert_eq!(forward, backward);
    Ok(())
}

#[rstest]
fn merge_refuses_to_overwrite_local_changes(init_repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = init_repository_dir.path();
    run_gitc_command(dir, &["switch", "-c", "feature"]).assert().success();
    commit_file(dir, "1.txt", "feature version", "Feature edits 1.txt");
    run_gitc_command(dir, &["switch", "main"]).assert().success();
    let main = head_oid(dir);
    write_file(FileSpec::new(dir.join("1.txt"), "uncommitted".to_string()));

    run_gitc_command(dir, &["merge", "feature"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("local changes would be overwritten"));

    assert_eq!(head_oid(dir), main);
    assert_eq!(read_file(&dir.join("1.txt")), "uncommitted");
    Ok(())
}
