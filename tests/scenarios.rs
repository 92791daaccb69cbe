//! End-to-end flows through the library API

use assert_fs::TempDir;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use gitc::areas::repository::Repository;
use gitc::artifacts::branch::branch_name::RefName;
use gitc::artifacts::log::log_filter::LogFilter;
use gitc::artifacts::merge::{MergeOptions, MergeOutcome};
use gitc::artifacts::objects::commit::{Author, Commit};
use gitc::artifacts::objects::object_id::ObjectId;
use gitc::artifacts::objects::object_type::ObjectType;
use gitc::artifacts::pack::object_walk::ObjectWalk;
use gitc::artifacts::pack::writer::write_pack;
use gitc::commands::porcelain::checkout::SwitchOptions;
use gitc::commands::porcelain::commit::MAX_COMMIT_ATTEMPTS;
use gitc::error::RepoError;
use gitc::transport::auth::{AUTHORIZED_KEYS_FILE, Ed25519KeyProvider};
use gitc::transport::connector::{Connection, Connector, Peer};
use gitc::transport::pkt_line::PktStream;
use gitc::transport::{PushResult, Service, TransportOptions};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn author(seconds: i64) -> Author {
    let when: DateTime<FixedOffset> = DateTime::from_timestamp(1_700_000_000 + seconds, 0)
        .unwrap()
        .fixed_offset();
    Author::new_with_timestamp("Scenario".to_string(), "scenario@example.com".to_string(), when)
}

async fn commit_files(repository: &Repository, files: &[(&str, &str)], message: &str, seconds: i64) -> ObjectId {
    let mut paths = Vec::new();
    for (path, content) in files {
        let absolute = repository.path().join(path);
        std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
        std::fs::write(&absolute, content).unwrap();
        paths.push(PathBuf::from(path));
    }
    repository.stage(&paths).await.unwrap();
    repository.commit(message, Some(author(seconds))).await.unwrap().oid
}

fn object_count(repository: &Repository) -> usize {
    walkdir::WalkDir::new(repository.database().objects_path())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

#[tokio::test]
async fn first_commit_is_a_root_with_one_entry() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    std::fs::write(dir.path().join("README.md"), "# project\n").unwrap();
    repository.stage(&[PathBuf::from("README.md")]).await.unwrap();

    let summary = repository.commit("init", Some(author(0))).await.unwrap();

    assert!(summary.is_root);
    let commit = repository.database().parse_object_as_commit(&summary.oid).unwrap();
    assert!(commit.parents().is_empty());
    let tree = repository.database().parse_object_as_tree(commit.tree_oid()).unwrap();
    let names = tree.entries().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["README.md"]);
}

#[tokio::test]
async fn log_walks_back_from_the_newest_commit() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    let a = commit_files(&repository, &[("a.txt", "a")], "A", 0).await;
    let b = commit_files(&repository, &[("b.txt", "b")], "B", 10).await;

    let logged = repository
        .log(&[b.to_string()], LogFilter::default())
        .unwrap()
        .map(|entry| entry.map(|(oid, _)| oid))
        .collect::<anyhow::Result<Vec<_>>>()
        .unwrap();

    assert_eq!(logged, vec![b.clone(), a]);
    assert_eq!(repository.refs().resolve("main").unwrap(), b);
}

#[tokio::test]
async fn branch_ahead_of_main_fast_forwards() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    let fork = commit_files(&repository, &[("shared.txt", "shared\n")], "X", 0).await;
    repository
        .switch(
            "feature",
            SwitchOptions {
                create: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let feature = commit_files(&repository, &[("feature.txt", "feature\n")], "F", 10).await;

    let outcome = repository
        .merge_commits(&fork, &feature, &MergeOptions::default())
        .unwrap();

    assert_eq!(outcome, MergeOutcome::FastForwarded(feature));
    assert_eq!(repository.refs().resolve("main").unwrap(), fork);
}

#[tokio::test]
async fn competing_edits_to_one_line_conflict() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    commit_files(&repository, &[("file.txt", "base\nsecond\n")], "base", 0).await;
    repository
        .switch(
            "feature",
            SwitchOptions {
                create: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let feature = commit_files(&repository, &[("file.txt", "feature\nsecond\n")], "feature edit", 10).await;
    repository.switch("main", SwitchOptions::default()).await.unwrap();
    let main = commit_files(&repository, &[("file.txt", "main\nsecond\n")], "main edit", 20).await;

    let outcome = repository
        .merge_commits(&main, &feature, &MergeOptions::default())
        .unwrap();
    assert_eq!(outcome.conflicted_paths(), vec![Path::new("file.txt")]);

    let outcome = repository.merge("feature", MergeOptions::default()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflicted(_)));
    assert_eq!(repository.refs().resolve("HEAD").unwrap(), main);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("file.txt")).unwrap(),
        "main\nsecond\n"
    );
}

#[tokio::test]
async fn stale_push_is_rejected_without_touching_the_local_store() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let server = Repository::init(server_dir.path()).unwrap();
    let a = commit_files(&server, &[("a.txt", "a")], "A", 0).await;

    let options = TransportOptions::default();
    let (client, _) = Repository::clone(
        &server.path().display().to_string(),
        &client_dir.path().join("client"),
        None,
        &options,
    )
    .await
    .unwrap();
    let b = commit_files(&server, &[("b.txt", "b")], "B", 10).await;
    let c = commit_files(&client, &[("c.txt", "c")], "C", 20).await;

    let before = object_count(&client);
    let result = client
        .push_ref("origin", "main", &c, Some(&a), &options)
        .await
        .unwrap();

    assert_eq!(result, PushResult::RejectedNonFastForward);
    assert_eq!(object_count(&client), before);
    assert_eq!(server.refs().resolve("main").unwrap(), b);
    assert!(!server.database().exists(&c));
}

/// Advertises one branch and answers every fetch with a fixed pack
struct FixedPackServer {
    tip: ObjectId,
    pack: Bytes,
    /// Send only this many pack bytes, then go quiet
    stall_at: Option<usize>,
}

impl FixedPackServer {
    fn new(tip: ObjectId, pack: Bytes) -> Self {
        FixedPackServer { tip, pack, stall_at: None }
    }

    fn stalling_at(self, bytes: usize) -> Self {
        FixedPackServer {
            stall_at: Some(bytes),
            ..self
        }
    }
}

#[async_trait]
impl Connector for FixedPackServer {
    async fn connect(&self, service: Service) -> anyhow::Result<Connection> {
        let (client, server) = tokio::io::duplex(1 << 20);
        let (reader, writer) = tokio::io::split(server);
        let tip = self.tip.clone();
        let pack = self.pack.clone();
        let stall_at = self.stall_at;

        let handle = tokio::spawn(async move {
            let mut stream = PktStream::new(reader, writer, Duration::from_secs(5), CancellationToken::new());
            let served: anyhow::Result<()> = async {
                stream.write_line(&format!("gitc {service} 1")).await?;
                stream.write_line(&format!("{tip} refs/heads/main")).await?;
                stream.flush().await?;
                stream.read_section().await?;
                stream.write_line("pack").await?;
                match stall_at {
                    Some(bytes) => {
                        stream.write(&pack[..bytes]).await?;
                        stream.sync().await?;
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                    None => stream.write_data(&pack).await,
                }
            }
            .await;
            if let Err(e) = served {
                eprintln!("fake server: {e:#}");
            }
        });

        let (reader, writer) = tokio::io::split(client);
        Ok(Connection {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: Peer::Task(handle),
        })
    }
}

async fn source_history() -> (TempDir, ObjectId, Vec<gitc::areas::database::RawObject>) {
    let dir = TempDir::new().unwrap();
    let source = Repository::init(dir.path()).unwrap();
    commit_files(&source, &[("one.txt", "one\n")], "one", 0).await;
    let tip = commit_files(&source, &[("dir/two.txt", "two\n")], "two", 10).await;
    let objects = ObjectWalk::new(source.database()).collect(&[tip.clone()]).unwrap();
    (dir, tip, objects)
}

fn fetching_repository(dir: &TempDir, server: FixedPackServer) -> (Repository, TransportOptions) {
    let repository = Repository::init(dir.path()).unwrap();
    repository.add_remote("origin", "served-by-test").unwrap();
    let options = TransportOptions::default().with_connector(Arc::new(server));
    (repository, options)
}

#[tokio::test]
async fn intact_pack_is_fetched() {
    let (_source, tip, objects) = source_history().await;
    let dir = TempDir::new().unwrap();
    let server = FixedPackServer::new(tip.clone(), write_pack(&objects).unwrap());
    let (repository, options) = fetching_repository(&dir, server);

    let summary = repository.fetch("origin", &[], &options).await.unwrap();

    assert_eq!(summary.objects.len(), objects.len());
    assert_eq!(repository.refs().resolve("origin/main").unwrap(), tip);
}

#[tokio::test]
async fn corrupt_object_in_a_pack_stores_nothing() {
    let (_source, tip, mut objects) = source_history().await;
    let blob = objects
        .iter_mut()
        .find(|object| object.object_type == ObjectType::Blob)
        .unwrap();
    blob.body = Bytes::from_static(b"tampered\n");
    let dir = TempDir::new().unwrap();
    let server = FixedPackServer::new(tip, write_pack(&objects).unwrap());
    let (repository, options) = fetching_repository(&dir, server);

    let err = repository.fetch("origin", &[], &options).await.unwrap_err();

    assert!(matches!(RepoError::find(&err), Some(RepoError::Corrupt { .. })), "{err:#}");
    for object in &objects {
        assert!(!repository.database().exists(&object.oid), "{} was stored", object.oid);
    }
    assert_eq!(object_count(&repository), 0);
    assert!(repository.refs().try_resolve("origin/main").unwrap().is_none());
}

#[tokio::test]
async fn fetch_that_times_out_mid_pack_stores_nothing() {
    let (_source, tip, objects) = source_history().await;
    let pack = write_pack(&objects).unwrap();
    let dir = TempDir::new().unwrap();
    let server = FixedPackServer::new(tip, pack.clone()).stalling_at(pack.len() / 2);
    let (repository, options) = fetching_repository(&dir, server);
    let options = options.with_timeouts(Duration::from_millis(200), Duration::from_secs(10));

    let err = repository.fetch("origin", &[], &options).await.unwrap_err();

    assert!(matches!(RepoError::find(&err), Some(RepoError::Timeout { .. })), "{err:#}");
    assert_eq!(object_count(&repository), 0);
    assert!(repository.refs().try_resolve("origin/main").unwrap().is_none());
}

#[tokio::test]
async fn fetch_cancelled_mid_pack_stores_nothing() {
    let (_source, tip, objects) = source_history().await;
    let pack = write_pack(&objects).unwrap();
    let dir = TempDir::new().unwrap();
    let server = FixedPackServer::new(tip, pack.clone()).stalling_at(pack.len() / 2);
    let (repository, options) = fetching_repository(&dir, server);
    let cancel = CancellationToken::new();
    let options = options.with_cancel(cancel.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let err = repository.fetch("origin", &[], &options).await.unwrap_err();

    assert!(matches!(RepoError::find(&err), Some(RepoError::Cancelled)), "{err:#}");
    assert_eq!(object_count(&repository), 0);
    assert!(repository.refs().try_resolve("origin/main").unwrap().is_none());
}

#[tokio::test]
async fn unlisted_key_is_refused_end_to_end() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let server = Repository::init(server_dir.path()).unwrap();
    let tip = commit_files(&server, &[("a.txt", "a")], "A", 0).await;
    let trusted = Ed25519KeyProvider::generate();
    std::fs::write(
        server.git_dir().join(AUTHORIZED_KEYS_FILE),
        format!("{} ci\n", trusted.public_key_hex()),
    )
    .unwrap();
    let client = Repository::init(client_dir.path()).unwrap();
    client.add_remote("origin", &server.path().display().to_string()).unwrap();

    let intruder = TransportOptions {
        key_provider: Some(Arc::new(Ed25519KeyProvider::generate())),
        ..Default::default()
    };
    let err = client.fetch("origin", &[], &intruder).await.unwrap_err();
    assert!(matches!(RepoError::find(&err), Some(RepoError::AuthFailed(_))), "{err:#}");
    let err = client.list_remote_refs("origin", &TransportOptions::default()).await.unwrap_err();
    assert!(matches!(RepoError::find(&err), Some(RepoError::AuthFailed(_))), "{err:#}");
    assert_eq!(object_count(&client), 0);
    assert!(client.refs().try_resolve("origin/main").unwrap().is_none());

    let trusted = TransportOptions {
        key_provider: Some(Arc::new(trusted)),
        ..Default::default()
    };
    client.fetch("origin", &[], &trusted).await.unwrap();
    assert_eq!(client.refs().resolve("origin/main").unwrap(), tip);
}

#[tokio::test]
async fn commit_gives_up_when_head_keeps_moving() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    let base = commit_files(&repository, &[("a.txt", "a")], "base", 0).await;
    let tree = repository.database().peel_to_tree(&base).unwrap();

    let mut attempts = 0;
    let mut interloper = None;
    let err = repository
        .update_head_with(|parent| {
            attempts += 1;
            let parents = parent.into_iter().cloned().collect::<Vec<_>>();
            let ours = Commit::new(parents.clone(), tree.clone(), author(10), "ours".to_string());
            let ours = repository.database().store_commit(&ours)?;
            // another writer moves the branch first
            let theirs = Commit::new(parents, tree.clone(), author(20), format!("theirs {attempts}"));
            let theirs = repository.database().store_commit(&theirs)?;
            repository.refs().update(&RefName::head(), parent, &theirs)?;
            interloper = Some(theirs);
            Ok(ours)
        })
        .unwrap_err();

    assert!(matches!(RepoError::find(&err), Some(RepoError::ConcurrentUpdate(_))), "{err:#}");
    assert_eq!(attempts, MAX_COMMIT_ATTEMPTS);
    assert_eq!(repository.refs().resolve("main").ok(), interloper);
}

#[tokio::test]
async fn lock_files_left_by_a_crash_do_not_block() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    let git_dir = repository.git_dir().to_path_buf();
    std::fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
    for leftover in ["repository.lock", "index.lock", "refs/heads/main.lock"] {
        std::fs::write(git_dir.join(leftover), "").unwrap();
    }
    let repository = repository.with_lock_timeout(Duration::from_millis(200));

    let first = commit_files(&repository, &[("a.txt", "a")], "A", 0).await;
    let second = commit_files(&repository, &[("b.txt", "b")], "B", 10).await;

    assert_eq!(repository.refs().resolve("main").unwrap(), second);
    let commit = repository.database().parse_object_as_commit(&second).unwrap();
    assert_eq!(commit.parents(), &[first]);
}

#[tokio::test(flavor = "current_thread")]
async fn waiting_for_the_repository_lock_lets_its_holder_finish() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap().with_lock_timeout(Duration::from_secs(5));
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    let held = repository.lock().await.unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);
    });
    let started = Instant::now();
    repository.stage(&[PathBuf::from("a.txt")]).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn creating_a_branch_over_local_edits_leaves_no_branch() {
    let dir = TempDir::new().unwrap();
    let repository = Repository::init(dir.path()).unwrap();
    let first = commit_files(&repository, &[("file.txt", "first\n")], "first", 0).await;
    commit_files(&repository, &[("file.txt", "second\n")], "second", 10).await;
    std::fs::write(dir.path().join("file.txt"), "local edit\n").unwrap();

    let err = repository
        .switch(
            "fresh",
            SwitchOptions {
                create: true,
                start_point: Some(first.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(RepoError::find(&err), Some(RepoError::DirtyWorkingTree(_))), "{err:#}");
    assert!(repository.refs().try_resolve("fresh").unwrap().is_none());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("file.txt")).unwrap(),
        "local edit\n"
    );
}
