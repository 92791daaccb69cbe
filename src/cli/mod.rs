//! Command-line interface of the `gitc` binary
//!
//! - `mod.rs`: argument definitions
//! - `run`: dispatch onto [`crate::areas::repository::Repository`] operations
//! - `render`: turning their results into terminal output

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod render;
pub mod run;

pub use run::run;

#[derive(Parser, Debug)]
#[command(
    name = "gitc",
    version,
    about = "A self-contained version-control client",
    long_about = "gitc keeps content-addressed history of a working tree, \
    merges branches and exchanges commits with other repositories over ssh \
    or local paths.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
pub struct Cli {
    /// Raise log verbosity (repeatable); `GITC_LOG` takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "PATH")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        name = "init",
        about = "Initialize a new repository",
        long_about = "This command initializes a new repository in the current directory or at the specified path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<PathBuf>,
    },
    #[command(
        name = "clone",
        about = "Copy a repository into a new directory",
        long_about = "This command creates a repository from a remote one, records it as origin \
        and checks out the branch the remote's HEAD follows."
    )]
    Clone {
        #[arg(index = 1, help = "ssh://, user@host:path or a local path")]
        url: String,
        #[arg(index = 2, help = "Destination directory (defaults to the url's last component)")]
        directory: Option<PathBuf>,
        #[arg(short, long, help = "Check out this branch instead of the remote's HEAD")]
        branch: Option<String>,
    },
    #[command(
        name = "add",
        about = "Stage file contents",
        long_about = "This command adds the current content of files to the index. \
        Tracked files that were deleted are removed from the index."
    )]
    Add {
        #[arg(index = 1, required = true, num_args = 1.., help = "Files or directories to stage")]
        paths: Vec<PathBuf>,
    },
    #[command(
        name = "commit",
        about = "Record the index as a new commit",
        long_about = "This command creates a new commit in the repository with the specified commit message."
    )]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: String,
        #[arg(long, requires = "author_email", help = "Author name, overriding the configured identity")]
        author_name: Option<String>,
        #[arg(long, requires = "author_name", help = "Author email, overriding the configured identity")]
        author_email: Option<String>,
    },
    #[command(name = "status", about = "Show the working tree status")]
    Status {
        #[arg(long, help = "Machine-readable two-letter codes")]
        porcelain: bool,
    },
    #[command(
        name = "diff",
        about = "Show changes",
        long_about = "Without arguments, changes in the working tree not yet staged. \
        With --cached, staged changes against HEAD. With two revisions, the changes between them. \
        Paths after -- limit the output to those files and directories."
    )]
    Diff {
        #[arg(long, alias = "staged", help = "Compare the index with HEAD")]
        cached: bool,
        #[arg(long, help = "Only list paths with their change letter")]
        name_status: bool,
        #[arg(long, value_name = "ADM", help = "Only Added, Deleted or Modified files")]
        diff_filter: Option<String>,
        #[arg(index = 1, num_args = 0..=2, help = "Revisions to compare")]
        revisions: Vec<String>,
        #[arg(index = 2, last = true, help = "Only these files or directories")]
        paths: Vec<PathBuf>,
    },
    #[command(name = "log", about = "Show commit history")]
    Log(LogArgs),
    #[command(name = "show", about = "Show a commit and its changes")]
    Show {
        #[arg(index = 1, default_value = "HEAD")]
        revision: String,
    },
    #[command(
        name = "blame",
        about = "Show which commit last changed each line of a file",
        long_about = "This command prints every line of a file as of a revision, prefixed with the \
        commit, author and date that introduced it. History is followed along first parents."
    )]
    Blame {
        #[arg(index = 1)]
        file: PathBuf,
        #[arg(index = 2, default_value = "HEAD")]
        revision: String,
        #[arg(short = 'L', value_name = "START,END", value_parser = parse_line_range, help = "Only these lines")]
        lines: Option<(usize, usize)>,
    },
    #[command(name = "branch", about = "List, create, rename or delete branches")]
    Branch(BranchArgs),
    #[command(
        name = "switch",
        visible_alias = "checkout",
        about = "Switch branches or check out a commit",
        long_about = "This command updates the working tree and index to a branch or commit. \
        Naming a branch attaches HEAD to it; any other revision detaches HEAD."
    )]
    Switch {
        #[arg(index = 1)]
        target: String,
        #[arg(short = 'c', short_alias = 'b', long, help = "Create the branch first")]
        create: bool,
        #[arg(index = 2, requires = "create", help = "Where the new branch starts")]
        start_point: Option<String>,
        #[arg(short, long, help = "Discard local changes in the paths being switched")]
        force: bool,
    },
    #[command(
        name = "merge",
        about = "Join another history into the current branch",
        long_about = "This command fast-forwards when possible and otherwise records a merge commit. \
        A merge with conflicts changes nothing and lists the conflicting paths."
    )]
    Merge {
        #[arg(index = 1)]
        revision: String,
        #[arg(long, help = "Always create a merge commit")]
        no_ff: bool,
        #[arg(short, long)]
        message: Option<String>,
    },
    #[command(name = "merge-base", about = "Print the best common ancestor of two commits")]
    MergeBase {
        #[arg(index = 1)]
        a: String,
        #[arg(index = 2)]
        b: String,
    },
    #[command(name = "tag", about = "Create, list or delete tags")]
    Tag {
        #[arg(index = 1, help = "Tag to create; lists tags when absent")]
        name: Option<String>,
        #[arg(index = 2, help = "What to tag (HEAD by default)")]
        target: Option<String>,
        #[arg(short, long, help = "Create an annotated tag with this message")]
        message: Option<String>,
        #[arg(short, long, requires = "name")]
        delete: bool,
    },
    #[command(name = "remote", about = "Manage remotes")]
    Remote {
        #[command(subcommand)]
        command: Option<RemoteCommand>,
    },
    #[command(name = "ls-remote", about = "List the refs of a remote")]
    LsRemote {
        #[arg(index = 1, default_value = "origin")]
        remote: String,
    },
    #[command(name = "fetch", about = "Download objects and refs from a remote")]
    Fetch {
        #[arg(index = 1, default_value = "origin")]
        remote: String,
        #[arg(index = 2, help = "Refs to fetch (all branches and tags by default)")]
        refs: Vec<String>,
    },
    #[command(name = "pull", about = "Fetch a branch and merge it")]
    Pull {
        #[arg(index = 1, help = "Remote to pull from (the branch's upstream, else origin)")]
        remote: Option<String>,
        #[arg(index = 2, help = "Branch to pull (the current branch's name by default)")]
        branch: Option<String>,
        #[arg(long)]
        no_ff: bool,
    },
    #[command(
        name = "push",
        about = "Update a remote branch",
        long_about = "This command uploads the commits a branch needs and moves the remote branch, \
        provided the remote is still where this repository last saw it."
    )]
    Push {
        #[arg(index = 1, help = "Remote to push to (the branch's upstream, else origin)")]
        remote: Option<String>,
        #[arg(index = 2, help = "Branch to push (the current branch by default)")]
        branch: Option<String>,
        #[arg(short = 'u', long, help = "Remember the remote as the branch's upstream")]
        set_upstream: bool,
    },
    #[command(name = "config", about = "Get and set options")]
    Config(ConfigArgs),
    #[command(
        name = "cat-file",
        about = "Print the content of an object",
        long_about = "This command prints the type, size or content of any object in the repository."
    )]
    CatFile {
        #[arg(short = 't', conflicts_with_all = ["size", "pretty"], help = "Print the object type")]
        kind: bool,
        #[arg(short = 's', conflicts_with = "pretty", help = "Print the object size")]
        size: bool,
        #[arg(short = 'p', help = "Pretty-print the content")]
        pretty: bool,
        #[arg(index = 1)]
        object: String,
    },
    #[command(
        name = "hash-object",
        about = "Hash a file as a blob and optionally write it to the object database"
    )]
    HashObject {
        #[arg(short, long, help = "Write the object to the object database")]
        write: bool,
        #[arg(index = 1)]
        file: PathBuf,
    },
    #[command(name = "ls-tree", about = "List the contents of a tree")]
    LsTree {
        #[arg(short = 'r', help = "Recurse into subtrees")]
        recursive: bool,
        #[arg(index = 1, default_value = "HEAD")]
        revision: String,
    },
    #[command(
        name = "serve",
        hide = true,
        about = "Serve upload-pack or receive-pack on stdin/stdout",
        long_about = "The command ssh runs on the remote host; not meant to be used directly."
    )]
    Serve {
        #[arg(index = 1, value_parser = ["upload-pack", "receive-pack"])]
        service: String,
        #[arg(index = 2)]
        path: PathBuf,
    },
    #[command(
        name = "keygen",
        about = "Generate an ed25519 key for authenticating to remotes",
        long_about = "This command writes a secret key (owner-readable only) and prints its public half. \
        A serving repository accepts the key once that line is added to its .gitc/authorized_keys."
    )]
    Keygen {
        #[arg(short, long, help = "Where to write the key (~/.gitc/id_ed25519 by default)")]
        output: Option<PathBuf>,
        #[arg(short, long, help = "Overwrite an existing key")]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct LogArgs {
    #[arg(index = 1, help = "Revisions or ranges (a..b) to start from; HEAD by default")]
    pub revisions: Vec<String>,
    #[arg(long, help = "One line per commit")]
    pub oneline: bool,
    #[arg(long, help = "Abbreviate commit ids")]
    pub abbrev_commit: bool,
    #[arg(long, help = "Only commits whose author contains this text")]
    pub author: Option<String>,
    #[arg(long, help = "Only commits at or after this date")]
    pub since: Option<String>,
    #[arg(long, help = "Only commits at or before this date")]
    pub until: Option<String>,
    #[arg(short = 'n', long, help = "Stop after this many commits")]
    pub max_count: Option<usize>,
    #[arg(long, help = "Do not show ref names")]
    pub no_decorate: bool,
}

#[derive(Args, Debug)]
pub struct BranchArgs {
    #[arg(index = 1, help = "Branch to create")]
    pub name: Option<String>,
    #[arg(index = 2, help = "Where the new branch starts (HEAD by default)")]
    pub start_point: Option<String>,
    #[arg(short, long, requires = "name", help = "Delete a merged branch")]
    pub delete: bool,
    #[arg(short = 'D', requires = "name", help = "Delete a branch even if unmerged")]
    pub force_delete: bool,
    #[arg(short, long, num_args = 2, value_names = ["OLD", "NEW"], help = "Rename a branch")]
    pub rename: Option<Vec<String>>,
    #[arg(short, long, help = "List remote-tracking branches too")]
    pub all: bool,
}

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    #[command(about = "Add a remote")]
    Add { name: String, url: String },
    #[command(visible_alias = "rm", about = "Remove a remote and its tracking refs")]
    Remove { name: String },
    #[command(about = "List remotes with their urls")]
    List,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(long, help = "Use the global file instead of the repository's")]
    pub global: bool,
    #[arg(short, long, conflicts_with_all = ["key", "unset"], help = "List every setting")]
    pub list: bool,
    #[arg(long, requires = "key", conflicts_with = "value", help = "Remove a setting")]
    pub unset: bool,
    #[arg(index = 1, help = "Dotted key, e.g. user.name")]
    pub key: Option<String>,
    #[arg(index = 2, help = "New value; prints the current one when absent")]
    pub value: Option<String>,
}

/// `3,9` -> `(3, 9)`; a single number means that line only
fn parse_line_range(value: &str) -> Result<(usize, usize), String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|_| format!("{part} is not a line number"))
    };
    match value.split_once(',') {
        Some((start, end)) => Ok((parse(start)?, parse(end)?)),
        None => parse(value).map(|line| (line, line)),
    }
}
