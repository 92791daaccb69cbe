use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::{Path, PathBuf};

mod common;

use common::command::{commit_file, head_oid, init_repository_dir, repository_dir, resolve, run_gitc_command, stdout_of};
use common::file::read_file;

const AUTHOR: [(&str, &str); 2] = [("GIT_AUTHOR_NAME", "fake_user"), ("GIT_AUTHOR_EMAIL", "fake_email@email.com")];

fn clone_into(server: &Path, parent: &Path, name: &str) -> PathBuf {
    run_gitc_command(parent, &["clone", &server.display().to_string(), name])
        .assert()
        .success();
    parent.join(name)
}

#[rstest]
fn clone_copies_history_and_checks_out_the_default_branch(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();

    run_gitc_command(repository_dir.path(), &["clone", &server.display().to_string(), "copy"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Cloning into '"))
        .stdout(predicate::str::contains("copy'..."));
    let client = repository_dir.path().join("copy");

    assert_eq!(head_oid(&client), head_oid(server));
    assert_eq!(resolve(&client, "origin/main"), head_oid(server));
    assert_eq!(read_file(&client.join("a/b/3.txt")), "three");
    run_gitc_command(&client, &["status"])
        .assert()
        .success()
        .stdout("On branch main\nnothing to commit, working tree clean\n");
    run_gitc_command(&client, &["remote"])
        .assert()
        .success()
        .stdout(format!("origin\t{}\n", server.display()));

    Ok(())
}

#[rstest]
fn cloning_an_empty_repository_warns(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = repository_dir.path();
    run_gitc_command(dir, &["init", "empty"]).assert().success();

    run_gitc_command(dir, &["clone", &dir.join("empty").display().to_string(), "copy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cloned an empty repository"));

    assert!(dir.join("copy/.gitc").is_dir());
    Ok(())
}

#[rstest]
fn cloning_into_a_non_empty_directory_fails(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(repository_dir.path().join("busy"))?;
    std::fs::write(repository_dir.path().join("busy/file.txt"), "taken")?;

    run_gitc_command(
        repository_dir.path(),
        &["clone", &init_repository_dir.path().display().to_string(), "busy"],
    )
    .assert()
    .failure()
    .stderr(predicate::str::contains("not empty"));

    assert!(!repository_dir.path().join("busy/.gitc").exists());
    Ok(())
}

#[rstest]
fn ls_remote_lists_advertised_refs(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    run_gitc_command(server, &["tag", "v1"]).assert().success();
    let client = clone_into(server, repository_dir.path(), "client");
    let head = head_oid(server);

    run_gitc_command(&client, &["ls-remote"])
        .assert()
        .success()
        .stdout(format!("{head}\tHEAD\n{head}\trefs/heads/main\n{head}\trefs/tags/v1\n"));

    Ok(())
}

#[rstest]
fn fetch_moves_remote_tracking_refs_only(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let client = clone_into(server, repository_dir.path(), "client");
    let before = head_oid(&client);
    let after = commit_file(server, "server.txt", "from server", "Server work");

    run_gitc_command(&client, &["fetch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("From origin"))
        .stdout(predicate::str::contains(format!(
            "{}..{}",
            &before[..7],
            &after[..7]
        )));

    assert_eq!(resolve(&client, "origin/main"), after);
    assert_eq!(head_oid(&client), before);
    assert!(!client.join("server.txt").exists());

    run_gitc_command(&client, &["fetch"]).assert().success().stdout("");
    Ok(())
}

#[rstest]
fn push_updates_the_remote_branch(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let client = clone_into(server, repository_dir.path(), "client");
    let pushed = commit_file(&client, "client.txt", "from client", "Client work");

    run_gitc_command(&client, &["push"])
        .assert()
        .success()
        .stdout("To origin\n   main -> main\n");

    assert_eq!(resolve(server, "main"), pushed);
    assert_eq!(resolve(&client, "origin/main"), pushed);
    run_gitc_command(server, &["log", "--oneline", "--no-decorate", "-n", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Client work"));

    Ok(())
}

#[rstest]
fn stale_push_is_rejected_until_pulled(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let alice = clone_into(server, repository_dir.path(), "alice");
    let bob = clone_into(server, repository_dir.path(), "bob");

    let from_alice = commit_file(&alice, "alice.txt", "alice", "Alice work");
    run_gitc_command(&alice, &["push"]).assert().success();

    let from_bob = commit_file(&bob, "bob.txt", "bob", "Bob work");
    run_gitc_command(&bob, &["push"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[rejected]"))
        .stdout(predicate::str::contains("non-fast-forward"));
    assert_eq!(resolve(server, "main"), from_alice);

    run_gitc_command(&bob, &["pull"])
        .envs(AUTHOR)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Merge made commit"));
    assert_eq!(read_file(&bob.join("alice.txt")), "alice");
    assert_eq!(read_file(&bob.join("bob.txt")), "bob");

    run_gitc_command(&bob, &["push"]).assert().success();
    let merged = head_oid(&bob);
    assert_eq!(resolve(server, "main"), merged);

    let pretty = stdout_of(&mut run_gitc_command(&bob, &["cat-file", "-p", "HEAD"]));
    assert!(pretty.contains(&format!("parent {from_bob}")), "{pretty}");
    assert!(pretty.contains(&format!("parent {from_alice}")), "{pretty}");
    assert!(pretty.contains("Merge branch 'main' of origin"), "{pretty}");

    Ok(())
}

#[rstest]
fn pull_fast_forwards_when_behind(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let client = clone_into(server, repository_dir.path(), "client");
    let after = commit_file(server, "server.txt", "from server", "Server work");

    run_gitc_command(&client, &["pull", "origin", "main"])
        .assert()
        .success()
        .stdout(format!("Fast-forward to {}\n", &after[..7]));

    assert_eq!(head_oid(&client), after);
    assert_eq!(read_file(&client.join("server.txt")), "from server");
    Ok(())
}

#[rstest]
fn remotes_are_added_listed_and_removed(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let client = clone_into(server, repository_dir.path(), "client");

    run_gitc_command(&client, &["remote", "add", "backup", "ssh://backup.example.com/srv/repo"])
        .assert()
        .success();
    run_gitc_command(&client, &["remote", "add", "backup", "elsewhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    run_gitc_command(&client, &["remote", "list"])
        .assert()
        .success()
        .stdout(format!(
            "backup\tssh://backup.example.com/srv/repo\norigin\t{}\n",
            server.display()
        ));

    run_gitc_command(&client, &["remote", "remove", "origin"]).assert().success();
    run_gitc_command(&client, &["remote"])
        .assert()
        .success()
        .stdout("backup\tssh://backup.example.com/srv/repo\n");
    run_gitc_command(&client, &["branch", "--all"])
        .assert()
        .success()
        .stdout("* main\n");

    Ok(())
}

#[rstest]
fn unreachable_remotes_are_reported(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let dir = repository_dir.path();
    run_gitc_command(dir, &["init"]).assert().success();
    run_gitc_command(dir, &["remote", "add", "origin", "/definitely/not/a/repository"])
        .assert()
        .success();

    run_gitc_command(dir, &["fetch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote unreachable"));

    Ok(())
}

#[rstest]
fn clone_can_check_out_another_branch(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    run_gitc_command(server, &["switch", "-c", "dev"]).assert().success();
    let dev = commit_file(server, "dev.txt", "in progress", "Dev work");
    run_gitc_command(server, &["switch", "main"]).assert().success();

    run_gitc_command(
        repository_dir.path(),
        &["clone", "--branch", "dev", &server.display().to_string(), "copy"],
    )
    .assert()
    .success();
    let client = repository_dir.path().join("copy");

    assert_eq!(head_oid(&client), dev);
    assert_eq!(read_file(&client.join("dev.txt")), "in progress");
    run_gitc_command(&client, &["status"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("On branch dev\n"));

    run_gitc_command(
        repository_dir.path(),
        &["clone", "-b", "nowhere", &server.display().to_string(), "missing"],
    )
    .assert()
    .failure()
    .stderr(predicate::str::contains("nowhere"));
    assert!(!repository_dir.path().join("missing").exists());

    Ok(())
}

#[rstest]
fn set_upstream_makes_the_remote_the_default(
    init_repository_dir: TempDir,
    repository_dir: TempDir,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = init_repository_dir.path();
    let client = clone_into(server, repository_dir.path(), "client");
    run_gitc_command(&client, &["remote", "add", "mirror", &server.display().to_string()])
        .assert()
        .success();
    run_gitc_command(&client, &["fetch", "mirror"]).assert().success();
    commit_file(&client, "one.txt", "1", "One");

    run_gitc_command(&client, &["push", "-u", "mirror"])
        .assert()
        .success()
        .stdout(predicate::str::contains("branch 'main' set up to track 'mirror/main'."));
    run_gitc_command(&client, &["config", "branch.main.remote"])
        .assert()
        .success()
        .stdout("mirror\n");

    let pushed = commit_file(&client, "two.txt", "2", "Two");
    run_gitc_command(&client, &["push"])
        .assert()
        .success()
        .stdout("To mirror\n   main -> main\n");
    assert_eq!(resolve(server, "main"), pushed);
    assert_eq!(resolve(&client, "mirror/main"), pushed);

    Ok(())
}
