pub mod chunk;
pub mod context;
pub mod git;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use chunk::{split_text, DEFAULT_MAX_MESSAGE_BYTES};
pub use context::{AssembledContext, Conclusion, PeerContext, SearchHit, SessionSummary};
pub use git::{GitChangeKind, GitState, GitStateChange};

/// Consuming surface whose lifecycle events invoke memlink.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum HostId {
    #[default]
    ClaudeCode,
    Cursor,
    Codex,
}

impl HostId {
    pub const ALL: [HostId; 3] = [HostId::ClaudeCode, HostId::Cursor, HostId::Codex];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostId::ClaudeCode => "claude_code",
            HostId::Cursor => "cursor",
            HostId::Codex => "codex",
        }
    }

    /// Built-in workspace name used when neither env nor file configure one.
    pub fn default_workspace(&self) -> &'static str {
        match self {
            HostId::ClaudeCode => "claude_code",
            HostId::Cursor => "cursor",
            HostId::Codex => "codex",
        }
    }

    /// Built-in peer name for the agent side of the conversation.
    pub fn default_ai_peer(&self) -> &'static str {
        match self {
            HostId::ClaudeCode => "claude",
            HostId::Cursor => "cursor",
            HostId::Codex => "codex",
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostId {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "claude_code" | "claude-code" | "claudecode" | "claude" => Ok(HostId::ClaudeCode),
            "cursor" => Ok(HostId::Cursor),
            "codex" => Ok(HostId::Codex),
            other => Err(format!("Unknown host: {other}")),
        }
    }
}

pub const DEFAULT_CONTEXT_TTL_SECS: u64 = 300;
pub const DEFAULT_REFRESH_MESSAGE_THRESHOLD: u64 = 30;

/// When a cached remote context stops being trusted.
///
/// `message_threshold` is the one place the activity-count limit lives; every
/// accessor reads it from here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPolicy {
    #[serde(default = "default_ttl_secs")]
    pub ttl_seconds: u64,
    #[serde(default = "default_message_threshold")]
    pub message_threshold: u64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_CONTEXT_TTL_SECS,
            message_threshold: DEFAULT_REFRESH_MESSAGE_THRESHOLD,
        }
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_CONTEXT_TTL_SECS
}

fn default_message_threshold() -> u64 {
    DEFAULT_REFRESH_MESSAGE_THRESHOLD
}

/// One outbound message waiting for upload confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub content: String,
    pub peer_id: String,
    pub cwd: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Lower-cases `input` and replaces every character outside `[a-z0-9-_]` with `-`.
pub fn sanitize_name(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
