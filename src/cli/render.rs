//! Terminal output for command results

use crate::areas::refs::Head;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::merge::MergeOutcome;
use crate::artifacts::merge::resolve::MergeConflict;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::StatusCategory;
use crate::artifacts::status::status_info::StatusInfo;
use crate::commands::porcelain::blame::BlameLine;
use crate::commands::porcelain::branch::BranchInfo;
use crate::commands::porcelain::diff::FilePatch;
use crate::commands::porcelain::fetch::FetchSummary;
use crate::transport::PushResult;
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogStyle {
    pub oneline: bool,
    pub abbrev_commit: bool,
    pub decorate: bool,
}

fn commit_id(oid: &ObjectId, abbrev: bool) -> String {
    if abbrev { oid.to_short_oid() } else { oid.to_string() }
}

fn colored_ref_name(name: &RefName) -> String {
    let short = name.short_name();
    if name.as_str().starts_with("refs/tags/") {
        format!("tag: {short}").yellow().bold().to_string()
    } else if name.as_str().starts_with("refs/remotes/") {
        short.red().bold().to_string()
    } else {
        short.green().bold().to_string()
    }
}

/// ` (HEAD -> main, tag: v1)` or nothing
pub fn decoration(oid: &ObjectId, refs: &HashMap<ObjectId, Vec<RefName>>, head: &Head) -> String {
    let mut names = refs.get(oid).cloned().unwrap_or_default();
    names.sort();

    let mut parts = Vec::new();
    match head {
        Head::Detached(detached) if detached == oid => parts.push("HEAD".cyan().bold().to_string()),
        _ => {}
    }
    for name in names.iter().filter(|name| !name.is_head()) {
        match head {
            Head::Branch(current) if current == name => parts.push(format!(
                "{} {}",
                "HEAD ->".cyan().bold(),
                colored_ref_name(name)
            )),
            _ => parts.push(colored_ref_name(name)),
        }
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!(" {}{}{}", "(".yellow(), parts.join(&", ".yellow().to_string()), ")".yellow())
    }
}

pub fn write_commit(
    out: &mut dyn Write,
    oid: &ObjectId,
    commit: &Commit,
    decoration: &str,
    style: LogStyle,
) -> anyhow::Result<()> {
    let id = commit_id(oid, style.abbrev_commit || style.oneline);

    if style.oneline {
        writeln!(out, "{}{} {}", id.yellow(), decoration, commit.short_message())?;
        return Ok(());
    }

    writeln!(out, "{}{}", format!("commit {id}").yellow(), decoration)?;
    if commit.is_merge() {
        let parents = commit
            .parents()
            .iter()
            .map(ObjectId::to_short_oid)
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "Merge: {parents}")?;
    }
    writeln!(out, "Author: {}", commit.author().display_name())?;
    writeln!(out, "Date:   {}", commit.author().readable_timestamp())?;
    writeln!(out)?;
    for line in commit.message().lines() {
        writeln!(out, "    {line}")?;
    }

    Ok(())
}

pub fn write_status(out: &mut dyn Write, branch: &Head, status: &StatusInfo) -> anyhow::Result<()> {
    match branch {
        Head::Branch(name) => writeln!(out, "On branch {}", name.short_name())?,
        Head::Detached(oid) => writeln!(out, "{} {}", "HEAD detached at".red(), oid.to_short_oid())?,
    }

    if status.is_clean() {
        writeln!(out, "nothing to commit, working tree clean")?;
        return Ok(());
    }

    let sections: [(&str, &[StatusCategory]); 3] = [
        (
            "Changes to be committed:",
            &[
                StatusCategory::StagedNew,
                StatusCategory::StagedModified,
                StatusCategory::StagedDeleted,
            ],
        ),
        (
            "Changes not staged for commit:",
            &[StatusCategory::UnstagedModified, StatusCategory::UnstagedDeleted],
        ),
        ("Untracked files:", &[StatusCategory::Untracked]),
    ];

    for (title, categories) in sections {
        let mut lines = categories
            .iter()
            .flat_map(|category| {
                status
                    .paths_in(*category)
                    .into_iter()
                    .map(move |path| (path, *category))
            })
            .collect::<Vec<_>>();
        if lines.is_empty() {
            continue;
        }
        lines.sort_by_key(|(path, _)| *path);

        writeln!(out)?;
        writeln!(out, "{title}")?;
        for (path, category) in lines {
            let path = path.display().to_string();
            let path = if category.is_staged() { path.green() } else { path.red() };
            writeln!(out, "{category}{path}")?;
        }
    }

    Ok(())
}

pub fn write_status_porcelain(out: &mut dyn Write, status: &StatusInfo) -> anyhow::Result<()> {
    for (code, path) in status.porcelain() {
        writeln!(out, "{code} {}", path.display())?;
    }
    Ok(())
}

pub fn write_name_status(out: &mut dyn Write, patches: &[FilePatch]) -> anyhow::Result<()> {
    for patch in patches {
        writeln!(out, "{}\t{}", patch.status, patch.path.display())?;
    }
    Ok(())
}

pub fn write_patches(out: &mut dyn Write, patches: &[FilePatch]) -> anyhow::Result<()> {
    for patch in patches {
        let (a, b) = (&patch.old, &patch.new);
        writeln!(
            out,
            "{}",
            format!("diff --git a/{} b/{}", patch.path.display(), patch.path.display()).bold()
        )?;

        if a.mode.is_none() {
            writeln!(out, "{}", format!("new file mode {}", b.pretty_mode()).bold())?;
        } else if b.mode.is_none() {
            writeln!(out, "{}", format!("deleted file mode {}", a.pretty_mode()).bold())?;
        } else if a.mode != b.mode {
            writeln!(out, "{}", format!("old mode {}", a.pretty_mode()).bold())?;
            writeln!(out, "{}", format!("new mode {}", b.pretty_mode()).bold())?;
        }

        if a.oid == b.oid {
            continue;
        }
        let mut oid_range = format!("index {}..{}", a.oid.to_short_oid(), b.oid.to_short_oid());
        if a.mode == b.mode {
            oid_range.push_str(&format!(" {}", a.pretty_mode()));
        }
        writeln!(out, "{}", oid_range.bold())?;

        match patch.hunks() {
            Some(hunks) => {
                writeln!(out, "{}", format!("--- {}", a.diff_path("a").display()).bold())?;
                writeln!(out, "{}", format!("+++ {}", b.diff_path("b").display()).bold())?;
                for hunk in hunks {
                    writeln!(out, "{}", hunk.header().cyan())?;
                    for edit in &hunk.edits {
                        writeln!(out, "{edit}")?;
                    }
                }
            }
            None => writeln!(
                out,
                "Binary files {} and {} differ",
                a.diff_path("a").display(),
                b.diff_path("b").display()
            )?,
        }
    }

    Ok(())
}

pub fn write_branches(out: &mut dyn Write, branches: &[BranchInfo]) -> anyhow::Result<()> {
    for branch in branches {
        let name = branch.name.short_name();
        if branch.is_current {
            writeln!(out, "* {}", name.green())?;
        } else if branch.name.as_str().starts_with("refs/remotes/") {
            writeln!(out, "  {}", format!("remotes/{name}").red())?;
        } else {
            writeln!(out, "  {name}")?;
        }
    }
    Ok(())
}

fn write_conflicts(out: &mut dyn Write, conflicts: &[MergeConflict]) -> anyhow::Result<()> {
    for conflict in conflicts {
        let kind = match (&conflict.base, &conflict.ours, &conflict.theirs) {
            (None, Some(_), Some(_)) => "add/add",
            (Some(_), None, _) | (Some(_), _, None) => "modify/delete",
            _ => "content",
        };
        writeln!(out, "CONFLICT ({kind}): {}", conflict.path.display())?;
    }
    Ok(())
}

/// Returns whether the merge went through
pub fn write_merge_outcome(out: &mut dyn Write, outcome: &MergeOutcome) -> anyhow::Result<bool> {
    match outcome {
        MergeOutcome::AlreadyUpToDate(_) => writeln!(out, "Already up to date.")?,
        MergeOutcome::FastForwarded(oid) => writeln!(out, "Fast-forward to {}", oid.to_short_oid())?,
        MergeOutcome::Merged(oid) => writeln!(out, "Merge made commit {}", oid.to_short_oid())?,
        MergeOutcome::Conflicted(conflicts) => {
            write_conflicts(out, conflicts)?;
            writeln!(
                out,
                "{}",
                "Automatic merge failed; nothing was changed. Resolve the conflicts on either side and merge again."
                    .red()
            )?;
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn write_fetch_summary(out: &mut dyn Write, remote: &str, summary: &FetchSummary) -> anyhow::Result<()> {
    if summary.updated.is_empty() {
        return Ok(());
    }

    writeln!(out, "From {remote}")?;
    for update in &summary.updated {
        let range = match &update.old {
            Some(old) => format!("{}..{}", old.to_short_oid(), update.new.to_short_oid()),
            None => "* [new]".to_string(),
        };
        writeln!(out, "   {range:<18} -> {}", update.name.short_name())?;
    }
    Ok(())
}

/// `1a2b3c4 (Ana 2024-03-01  7) line`
pub fn write_blame(out: &mut dyn Write, lines: &[BlameLine]) -> anyhow::Result<()> {
    let number_width = lines.last().map_or(1, |line| line.number.to_string().len());
    let author_width = lines
        .iter()
        .map(|line| line.author.name().chars().count())
        .max()
        .unwrap_or(0);

    for line in lines {
        writeln!(
            out,
            "{} ({:<author_width$} {} {:>number_width$}) {}",
            line.oid.to_short_oid().yellow(),
            line.author.name(),
            line.author.timestamp().format("%Y-%m-%d"),
            line.number,
            line.content
        )?;
    }
    Ok(())
}

/// Returns whether the push was accepted
pub fn write_push_result(out: &mut dyn Write, branch: &str, result: &PushResult) -> anyhow::Result<bool> {
    match result {
        PushResult::Accepted => {
            writeln!(out, "   {branch} -> {branch}")?;
            return Ok(true);
        }
        PushResult::RejectedNonFastForward => writeln!(
            out,
            "{} {branch} -> {branch} (non-fast-forward)\nhint: fetch and merge the remote changes before pushing again",
            " ! [rejected]".red()
        )?,
        PushResult::RejectedByRemote(reason) => {
            writeln!(out, "{} {branch} -> {branch} ({reason})", " ! [remote rejected]".red())?
        }
        PushResult::TransportError(reason) => {
            writeln!(out, "{} {branch} ({reason})", " ! [failed]".red())?
        }
    }
    Ok(false)
}
