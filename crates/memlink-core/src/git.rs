use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repository state observed for one working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitState {
    pub branch: String,
    pub commit: String,
    #[serde(default)]
    pub commit_message: String,
    pub is_dirty: bool,
    #[serde(default)]
    pub dirty_files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GitChangeKind {
    Initial,
    BranchSwitch,
    NewCommits,
    FilesChanged,
}

impl GitChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitChangeKind::Initial => "initial",
            GitChangeKind::BranchSwitch => "branch_switch",
            GitChangeKind::NewCommits => "new_commits",
            GitChangeKind::FilesChanged => "files_changed",
        }
    }
}

impl fmt::Display for GitChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change synthesized by diffing two captured states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitStateChange {
    pub kind: GitChangeKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}
