//! Dispatch of parsed arguments onto repository operations

use crate::areas::config::Config;
use crate::areas::refs::Head;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::core::PagerWriter;
use crate::artifacts::diff::tree_diff::DiffFilter;
use crate::artifacts::log::log_filter::LogFilter;
use crate::artifacts::merge::MergeOptions;
use crate::artifacts::objects::commit::{Author, parse_date};
use crate::cli::render::{self, LogStyle};
use crate::cli::{BranchArgs, Cli, Commands, ConfigArgs, LogArgs, RemoteCommand};
use crate::commands::porcelain::checkout::SwitchOptions;
use crate::commands::porcelain::diff::DiffSource;
use crate::transport::auth::Ed25519KeyProvider;
use crate::transport::server::serve;
use crate::transport::TransportOptions;
use anyhow::Context;
use is_terminal::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Run one command; `Ok(ExitCode::FAILURE)` for refusals that are not errors
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cwd = match &cli.directory {
        Some(directory) => directory.clone(),
        None => std::env::current_dir().context("unable to read the current directory")?,
    };
    let cwd = cwd
        .canonicalize()
        .with_context(|| format!("{} does not exist", cwd.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Init { path } => {
            let path = path.map_or_else(|| cwd.clone(), |path| cwd.join(path));
            let repository = Repository::init(&path)?;
            writeln!(
                out,
                "Initialized empty gitc repository in {}",
                repository.git_dir().display()
            )?;
        }
        Commands::Clone { url, directory, branch } => {
            let directory = match directory {
                Some(directory) => cwd.join(directory),
                None => cwd.join(default_clone_directory(&url)?),
            };
            let options = transport_options(Config::load_global()?)?;
            writeln!(out, "Cloning into '{}'...", directory.display())?;
            let (_, summary) = Repository::clone(&url, &directory, branch.as_deref(), &options).await?;
            if summary.fetched.is_empty() {
                writeln!(out, "warning: you appear to have cloned an empty repository.")?;
            }
        }
        Commands::Add { paths } => {
            let repository = Repository::discover(&cwd)?;
            let paths = paths
                .iter()
                .map(|path| repository.workspace().relative_path(&cwd, path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            repository.stage(&paths).await?;
        }
        Commands::Commit {
            message,
            author_name,
            author_email,
        } => {
            let repository = Repository::discover(&cwd)?;
            let author = match (author_name, author_email) {
                (Some(name), Some(email)) => Some(Author::new(name, email)),
                _ => None,
            };
            let summary = repository.commit(&message, author).await?;
            let branch = summary
                .branch
                .as_ref()
                .map_or_else(|| "detached HEAD".to_string(), ToString::to_string);
            let root = if summary.is_root { " (root-commit)" } else { "" };
            writeln!(
                out,
                "[{branch}{root} {}] {}",
                summary.oid.to_short_oid(),
                summary.short_message
            )?;
        }
        Commands::Status { porcelain } => {
            let repository = Repository::discover(&cwd)?;
            let status = repository.status().await?;
            if porcelain {
                render::write_status_porcelain(&mut out, &status)?;
            } else {
                render::write_status(&mut out, &repository.refs().head()?, &status)?;
            }
        }
        Commands::Diff {
            cached,
            name_status,
            diff_filter,
            revisions,
            paths,
        } => {
            let repository = Repository::discover(&cwd)?;
            let paths = paths
                .iter()
                .map(|path| repository.workspace().relative_path(&cwd, path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let filter = match diff_filter {
                Some(filter) => DiffFilter::try_parse(&filter)
                    .with_context(|| format!("invalid --diff-filter {filter}, use A, D and M"))?,
                None => DiffFilter::all(),
            };
            let source = match (revisions.as_slice(), cached) {
                ([], false) => DiffSource::WorkspaceVsIndex,
                ([], true) => DiffSource::IndexVsHead,
                ([from], _) => DiffSource::Revisions {
                    from: from.clone(),
                    to: "HEAD".to_string(),
                },
                ([from, to, ..], _) => DiffSource::Revisions {
                    from: from.clone(),
                    to: to.clone(),
                },
            };
            let patches = repository.diff(source, filter, &paths).await?;
            if name_status {
                render::write_name_status(&mut out, &patches)?;
            } else {
                render::write_patches(&mut out, &patches)?;
            }
        }
        Commands::Log(args) => {
            let repository = Repository::discover(&cwd)?;
            drop(out);
            log(&repository, args)?;
        }
        Commands::Show { revision } => {
            let repository = Repository::discover(&cwd)?;
            let info = repository.show(&revision)?;
            let decoration = render::decoration(&info.oid, &repository.decorations()?, &repository.refs().head()?);
            render::write_commit(&mut out, &info.oid, &info.commit, &decoration, LogStyle::default())?;
            writeln!(out)?;
            render::write_patches(&mut out, &info.patches)?;
        }
        Commands::Blame { file, revision, lines } => {
            let repository = Repository::discover(&cwd)?;
            let path = repository.workspace().relative_path(&cwd, &file)?;
            render::write_blame(&mut out, &repository.blame(&path, &revision, lines)?)?;
        }
        Commands::Branch(args) => {
            let repository = Repository::discover(&cwd)?;
            branch(&repository, args, &mut out).await?;
        }
        Commands::Switch {
            target,
            create,
            start_point,
            force,
        } => {
            let repository = Repository::discover(&cwd)?;
            let outcome = repository
                .switch(
                    &target,
                    SwitchOptions {
                        create,
                        start_point,
                        force,
                    },
                )
                .await?;
            match (&outcome.head, outcome.created) {
                (_, true) => writeln!(out, "Switched to a new branch '{target}'")?,
                (Head::Branch(name), false) => {
                    writeln!(out, "Switched to branch '{}'", name.short_name())?
                }
                (Head::Detached(oid), false) => {
                    writeln!(out, "HEAD is now at {}", oid.to_short_oid())?
                }
            }
        }
        Commands::Merge {
            revision,
            no_ff,
            message,
        } => {
            let repository = Repository::discover(&cwd)?;
            let outcome = repository.merge(&revision, MergeOptions { no_ff, message }).await?;
            if !render::write_merge_outcome(&mut out, &outcome)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::MergeBase { a, b } => {
            let repository = Repository::discover(&cwd)?;
            let base = repository.merge_base(&repository.resolve_commit(&a)?, &repository.resolve_commit(&b)?)?;
            writeln!(out, "{base}")?;
        }
        Commands::Tag {
            name,
            target,
            message,
            delete,
        } => {
            let repository = Repository::discover(&cwd)?;
            match name {
                Some(name) if delete => {
                    let oid = repository.delete_tag(&name)?;
                    writeln!(out, "Deleted tag '{name}' (was {})", oid.to_short_oid())?;
                }
                Some(name) => {
                    repository.create_tag(&name, target.as_deref(), message.as_deref())?;
                }
                None => {
                    for tag in repository.list_tags()? {
                        writeln!(out, "{}", tag.name.short_name())?;
                    }
                }
            }
        }
        Commands::Remote { command } => {
            let repository = Repository::discover(&cwd)?;
            match command.unwrap_or(RemoteCommand::List) {
                RemoteCommand::Add { name, url } => repository.add_remote(&name, &url)?,
                RemoteCommand::Remove { name } => repository.remove_remote(&name).await?,
                RemoteCommand::List => {
                    for (name, url) in repository.list_remotes()? {
                        writeln!(out, "{name}\t{url}")?;
                    }
                }
            }
        }
        Commands::LsRemote { remote } => {
            let repository = Repository::discover(&cwd)?;
            let options = transport_options(repository.config()?)?;
            let refs = repository.list_remote_refs(&remote, &options).await?;
            for (name, oid) in &refs.refs {
                writeln!(out, "{oid}\t{name}")?;
            }
        }
        Commands::Fetch { remote, refs } => {
            let repository = Repository::discover(&cwd)?;
            let options = transport_options(repository.config()?)?;
            let summary = repository.fetch(&remote, &refs, &options).await?;
            render::write_fetch_summary(&mut out, &remote, &summary)?;
        }
        Commands::Pull { remote, branch, no_ff } => {
            let repository = Repository::discover(&cwd)?;
            let remote = match remote {
                Some(remote) => remote,
                None => repository.upstream_remote(branch.as_deref())?,
            };
            let options = transport_options(repository.config()?)?;
            let outcome = repository
                .pull(
                    &remote,
                    branch.as_deref(),
                    MergeOptions {
                        no_ff,
                        message: None,
                    },
                    &options,
                )
                .await?;
            if !render::write_merge_outcome(&mut out, &outcome)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Push {
            remote,
            branch,
            set_upstream,
        } => {
            let repository = Repository::discover(&cwd)?;
            let remote = match remote {
                Some(remote) => remote,
                None => repository.upstream_remote(branch.as_deref())?,
            };
            let options = transport_options(repository.config()?)?;
            let result = repository.push(&remote, branch.as_deref(), &options).await?;
            let shown = match branch {
                Some(branch) => branch,
                None => repository
                    .refs()
                    .current_branch()?
                    .map(|branch| branch.to_string())
                    .unwrap_or_default(),
            };
            writeln!(out, "To {remote}")?;
            if !render::write_push_result(&mut out, &shown, &result)? {
                return Ok(ExitCode::FAILURE);
            }
            if set_upstream {
                repository.set_upstream(&BranchName::try_parse(&shown)?, &remote)?;
                writeln!(out, "branch '{shown}' set up to track '{remote}/{shown}'.")?;
            }
        }
        Commands::Config(args) => {
            if !config(&cwd, args, &mut out)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::CatFile {
            kind,
            size,
            pretty,
            object,
        } => {
            let repository = Repository::discover(&cwd)?;
            let object = repository.cat_file(&object)?;
            if kind {
                writeln!(out, "{}", object.object_type.as_str())?;
            } else if size {
                writeln!(out, "{}", object.size())?;
            } else if pretty {
                write!(out, "{}", object.pretty()?)?;
            } else {
                out.write_all(&object.body)?;
            }
        }
        Commands::HashObject { write, file } => {
            let repository = Repository::discover(&cwd)?;
            let oid = repository.hash_object(&cwd.join(file), write)?;
            writeln!(out, "{oid}")?;
        }
        Commands::LsTree { recursive, revision } => {
            let repository = Repository::discover(&cwd)?;
            for item in repository.ls_tree(&revision, recursive)? {
                writeln!(
                    out,
                    "{:06o} {} {}\t{}",
                    item.mode.as_u32(),
                    item.object_type.as_str(),
                    item.oid,
                    item.path.display()
                )?;
            }
        }
        Commands::Serve { service, path } => {
            drop(out);
            let repository = Repository::open(&cwd.join(path))?;
            let timeout = repository.config()?.timeout()?;
            serve(
                &repository,
                service.parse()?,
                tokio::io::stdin(),
                tokio::io::stdout(),
                timeout,
            )
            .await?;
        }
        Commands::Keygen { output, force } => {
            let path = match output {
                Some(path) => cwd.join(path),
                None => Ed25519KeyProvider::default_path()
                    .context("HOME is not set, pass --output")?,
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to replace it", path.display());
            }
            let key = Ed25519KeyProvider::generate();
            key.save(&path)?;
            writeln!(out, "Wrote {}", path.display())?;
            writeln!(out, "{}", key.public_key_hex())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Transport settings from configuration, cancelled by Ctrl-C
fn transport_options(config: Config) -> anyhow::Result<TransportOptions> {
    let options = TransportOptions::from_config(&config)?;
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });
    Ok(options)
}

/// `ssh://host/srv/project.git` -> `project`
fn default_clone_directory(url: &str) -> anyhow::Result<PathBuf> {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .filter(|name| !name.is_empty())
        .with_context(|| format!("cannot guess a directory name from {url}, pass one"))?;

    Ok(PathBuf::from(last.strip_suffix(".git").unwrap_or(last)))
}

fn log(repository: &Repository, args: LogArgs) -> anyhow::Result<()> {
    let date = |value: &Option<String>| -> anyhow::Result<_> {
        value
            .as_deref()
            .map(|value| parse_date(value).with_context(|| format!("unrecognized date {value}")))
            .transpose()
    };
    let filter = LogFilter {
        author: args.author,
        since: date(&args.since)?,
        until: date(&args.until)?,
        max_count: args.max_count,
    };
    let style = LogStyle {
        oneline: args.oneline,
        abbrev_commit: args.abbrev_commit,
        decorate: !args.no_decorate,
    };

    let decorations = repository.decorations()?;
    let head = repository.refs().head()?;
    let rev_list = repository.log(&args.revisions, filter)?;

    let write_all = |out: &mut dyn Write| -> anyhow::Result<()> {
        for entry in rev_list {
            let (oid, commit) = entry?;
            let decoration = if style.decorate {
                render::decoration(&oid, &decorations, &head)
            } else {
                String::new()
            };
            render::write_commit(out, &oid, &commit, &decoration, style)?;
            if !style.oneline {
                writeln!(out)?;
            }
        }
        Ok(())
    };

    if std::io::stdout().is_terminal() {
        let pager = minus::Pager::new();
        write_all(&mut PagerWriter::new(pager.clone()))?;
        minus::page_all(pager)?;
    } else {
        write_all(&mut std::io::stdout().lock())?;
    }

    Ok(())
}

async fn branch(repository: &Repository, args: BranchArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    if let Some(names) = args.rename {
        let [old, new] = names.as_slice() else {
            anyhow::bail!("--rename takes the old and the new name");
        };
        repository.rename_branch(old, new).await?;
        return Ok(());
    }

    match args.name {
        Some(name) if args.delete || args.force_delete => {
            let oid = repository.delete_branch(&name, args.force_delete).await?;
            writeln!(out, "Deleted branch {name} (was {}).", oid.to_short_oid())?;
        }
        Some(name) => {
            repository.create_branch(&name, args.start_point.as_deref())?;
        }
        None => render::write_branches(out, &repository.list_branches(args.all)?)?,
    }

    Ok(())
}

/// Returns false when a key asked for is not set
fn config(cwd: &Path, args: ConfigArgs, out: &mut dyn Write) -> anyhow::Result<bool> {
    let mut config = if args.global {
        Config::global_path().context("HOME is not set and GITC_CONFIG_GLOBAL is empty")?;
        Config::load_global()?
    } else {
        Repository::discover(cwd)?.config()?
    };

    if args.list {
        for (key, value) in config.list() {
            writeln!(out, "{key}={value}")?;
        }
        return Ok(true);
    }

    let key = args.key.context("a key is required unless --list is given")?;
    if args.unset {
        return config.unset(&key);
    }
    match args.value {
        Some(value) => {
            config.set(&key, &value)?;
            Ok(true)
        }
        None => match config.get(&key) {
            Some(value) => {
                writeln!(out, "{value}")?;
                Ok(true)
            }
            None => Ok(false),
        },
    }
}
