//! Never-expiring map from logical names to remote-assigned IDs (`cache.json`).

use crate::{read_json_or_default, write_json_atomic, CacheDir, StorageError, IDENTITY_CACHE_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub name: String,
    pub id: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct WorkspaceScope {
    #[serde(default)]
    peers: BTreeMap<String, String>,
    /// Keyed by working directory.
    #[serde(default)]
    sessions: BTreeMap<String, SessionRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct IdentityCacheFile {
    /// Workspace name to workspace ID.
    #[serde(default)]
    workspaces: BTreeMap<String, String>,
    /// Peers and sessions, keyed by the workspace ID they belong to.
    #[serde(default)]
    scopes: BTreeMap<String, WorkspaceScope>,
}

/// Peers and sessions are workspace-scoped remotely, so they are stored under
/// the owning workspace ID. Hosts with different workspaces share the file
/// without evicting each other.
pub struct IdentityCache {
    path: PathBuf,
}

impl IdentityCache {
    pub fn new(cache_dir: &CacheDir) -> Self {
        Self {
            path: cache_dir.path(IDENTITY_CACHE_FILE),
        }
    }

    pub fn workspace_id(&self, name: &str) -> Option<String> {
        self.load().workspaces.get(name).cloned()
    }

    pub fn set_workspace(&self, name: &str, id: &str) -> Result<(), StorageError> {
        let mut file = self.load();
        file.workspaces.insert(name.to_string(), id.to_string());
        self.store(&file)
    }

    pub fn peer_id(&self, workspace_id: &str, name: &str) -> Option<String> {
        self.load()
            .scopes
            .get(workspace_id)
            .and_then(|scope| scope.peers.get(name).cloned())
    }

    pub fn set_peer(&self, workspace_id: &str, name: &str, id: &str) -> Result<(), StorageError> {
        let mut file = self.load();
        file.scopes
            .entry(workspace_id.to_string())
            .or_default()
            .peers
            .insert(name.to_string(), id.to_string());
        self.store(&file)
    }

    /// Cached session for `cwd`, only if it was stored under the same name.
    pub fn session_id(&self, workspace_id: &str, cwd: &str, name: &str) -> Option<String> {
        self.session(workspace_id, cwd)
            .filter(|record| record.name == name)
            .map(|record| record.id)
    }

    pub fn session(&self, workspace_id: &str, cwd: &str) -> Option<SessionRecord> {
        self.load()
            .scopes
            .get(workspace_id)
            .and_then(|scope| scope.sessions.get(cwd).cloned())
    }

    pub fn set_session(
        &self,
        workspace_id: &str,
        cwd: &str,
        name: &str,
        id: &str,
    ) -> Result<(), StorageError> {
        let mut file = self.load();
        file.scopes
            .entry(workspace_id.to_string())
            .or_default()
            .sessions
            .insert(
                cwd.to_string(),
                SessionRecord {
                    name: name.to_string(),
                    id: id.to_string(),
                    updated_at: Utc::now(),
                },
            );
        self.store(&file)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store(&IdentityCacheFile::default())
    }

    fn load(&self) -> IdentityCacheFile {
        read_json_or_default(&self.path)
    }

    fn store(&self, file: &IdentityCacheFile) -> Result<(), StorageError> {
        write_json_atomic(&self.path, file)
    }
}
