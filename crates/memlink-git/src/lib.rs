//! Repository state capture and diffing between invocations.
//!
//! Each hook process captures the working directory's branch, head and
//! dirtiness, compares it with what the previous process stored, and turns the
//! difference into [`GitStateChange`] events.

use chrono::Utc;
use memlink_core::{GitChangeKind, GitState, GitStateChange};
use memlink_storage::{GitStateStore, StorageError};
use std::io;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

pub const MAX_DIRTY_FILES: usize = 20;
pub const MAX_REPORTED_FILES: usize = 5;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git executable not found")]
    Missing,
    #[error("not a git repository")]
    NotRepo,
    #[error("git command failed: {0}")]
    Command(String),
}

/// Snapshot plus the changes it implies relative to the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedState {
    pub state: GitState,
    pub changes: Vec<GitStateChange>,
}

/// `None` outside version control or when git is unavailable.
pub fn capture(cwd: &Path) -> Option<GitState> {
    match try_capture(cwd) {
        Ok(state) => Some(state),
        Err(GitError::NotRepo) => None,
        Err(err) => {
            debug!("git_capture_skipped: {}: {err}", cwd.display());
            None
        }
    }
}

pub fn try_capture(cwd: &Path) -> Result<GitState, GitError> {
    let inside = run_git(cwd, &["rev-parse", "--is-inside-work-tree"])?;
    if inside.trim() != "true" {
        return Err(GitError::NotRepo);
    }

    let branch = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])
        .or_else(|_| run_git(cwd, &["symbolic-ref", "--short", "HEAD"]))
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    // An unborn branch has no HEAD commit yet.
    let commit = run_git(cwd, &["rev-parse", "--short", "HEAD"])
        .map(|value| value.trim().to_string())
        .unwrap_or_default();
    let commit_message = if commit.is_empty() {
        String::new()
    } else {
        run_git(cwd, &["log", "-1", "--pretty=%s"])
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    };

    let status = run_git(cwd, &["status", "--porcelain"])?;
    let is_dirty = !status.trim().is_empty();
    let dirty_files = parse_dirty_files(&status);

    Ok(GitState {
        branch,
        commit,
        commit_message,
        is_dirty,
        dirty_files,
        timestamp: Utc::now(),
    })
}

/// Changes between two snapshots. A missing `previous` yields exactly one
/// `initial` change; otherwise branch, head and clean-to-dirty checks may each
/// fire. Dirty-to-clean is intentionally silent.
pub fn diff(previous: Option<&GitState>, current: &GitState) -> Vec<GitStateChange> {
    let Some(previous) = previous else {
        return vec![initial_change(current)];
    };

    let mut changes = Vec::new();

    if previous.branch != current.branch {
        changes.push(GitStateChange {
            kind: GitChangeKind::BranchSwitch,
            description: format!(
                "Switched branch from {} to {}",
                previous.branch, current.branch
            ),
            from: Some(previous.branch.clone()),
            to: Some(current.branch.clone()),
            files: Vec::new(),
        });
    }

    if previous.commit != current.commit {
        let description = if current.commit_message.is_empty() {
            format!("New commit on {}: {}", current.branch, current.commit)
        } else {
            format!(
                "New commit on {}: {} {}",
                current.branch, current.commit, current.commit_message
            )
        };
        changes.push(GitStateChange {
            kind: GitChangeKind::NewCommits,
            description,
            from: Some(previous.commit.clone()).filter(|value| !value.is_empty()),
            to: Some(current.commit.clone()).filter(|value| !value.is_empty()),
            files: Vec::new(),
        });
    }

    if !previous.is_dirty && current.is_dirty {
        let files: Vec<String> = current
            .dirty_files
            .iter()
            .take(MAX_REPORTED_FILES)
            .cloned()
            .collect();
        changes.push(GitStateChange {
            kind: GitChangeKind::FilesChanged,
            description: format!(
                "Uncommitted changes in {} file(s): {}",
                current.dirty_files.len(),
                files.join(", ")
            ),
            from: None,
            to: None,
            files,
        });
    }

    changes
}

/// Captures `cwd`, diffs against the stored snapshot and persists the new one.
pub fn track(store: &GitStateStore, cwd: &Path) -> Result<Option<TrackedState>, StorageError> {
    let Some(state) = capture(cwd) else {
        return Ok(None);
    };
    let key = cwd.to_string_lossy();
    let previous = store.load(&key);
    let changes = diff(previous.as_ref(), &state);
    store.save(&key, &state)?;
    Ok(Some(TrackedState { state, changes }))
}

fn initial_change(current: &GitState) -> GitStateChange {
    let mut description = if current.commit.is_empty() {
        format!("Session started on branch {} (no commits yet)", current.branch)
    } else {
        format!(
            "Session started on branch {} at {}: {}",
            current.branch, current.commit, current.commit_message
        )
    };
    if current.is_dirty {
        description.push_str(&format!(
            " with {} uncommitted file(s)",
            current.dirty_files.len()
        ));
    }
    GitStateChange {
        kind: GitChangeKind::Initial,
        description,
        from: None,
        to: Some(current.branch.clone()),
        files: Vec::new(),
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                GitError::Missing
            } else {
                GitError::Command(err.to_string())
            }
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(GitError::NotRepo);
        }
        return Err(GitError::Command(stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Paths from `git status --porcelain`, capped at [`MAX_DIRTY_FILES`].
fn parse_dirty_files(status: &str) -> Vec<String> {
    status
        .lines()
        .filter_map(parse_status_path)
        .take(MAX_DIRTY_FILES)
        .collect()
}

fn parse_status_path(line: &str) -> Option<String> {
    if line.len() < 4 {
        return None;
    }
    let path = line.get(3..)?.trim();
    let path = match path.split_once("->") {
        Some((_, renamed)) => renamed.trim(),
        None => path,
    };
    Some(path.trim_matches('"').to_string()).filter(|path| !path.is_empty())
}
