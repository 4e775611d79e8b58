//! Read-through resolution of workspace, peer and session IDs.
//!
//! The identity cache never expires, so each logical name costs one remote
//! call for the lifetime of the cache directory.

use crate::api::MemoryApi;
use crate::RemoteError;
use futures_util::try_join;
use memlink_config::{session_name, ResolvedConfig};
use memlink_storage::{CacheDir, IdentityCache};
use tracing::{debug, warn};

/// Every remote ID a hook needs for one working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identities {
    pub workspace_id: String,
    pub user_peer_id: String,
    pub ai_peer_id: String,
    pub session_id: String,
    pub session_name: String,
    pub user_peer_name: String,
    pub ai_peer_name: String,
}

impl Identities {
    /// Queued records name their peer logically; this maps such a name to the
    /// resolved ID. Anything else is assumed to already be an ID.
    pub fn peer_id_for(&self, stored: &str) -> String {
        if stored == self.user_peer_name {
            self.user_peer_id.clone()
        } else if stored == self.ai_peer_name {
            self.ai_peer_id.clone()
        } else {
            stored.to_string()
        }
    }
}

pub struct IdentityResolver<'a, A: ?Sized> {
    api: &'a A,
    cache: IdentityCache,
}

impl<'a, A: MemoryApi + ?Sized> IdentityResolver<'a, A> {
    pub fn new(api: &'a A, cache_dir: &CacheDir) -> Self {
        Self {
            api,
            cache: IdentityCache::new(cache_dir),
        }
    }

    pub async fn resolve(
        &self,
        config: &ResolvedConfig,
        cwd: &str,
    ) -> Result<Identities, RemoteError> {
        let session_name = session_name(config, cwd);
        let workspace_id = self.workspace(&config.workspace_name).await?;
        let (user_peer_id, ai_peer_id, session_id) = try_join!(
            self.peer(&workspace_id, &config.user_peer_name),
            self.peer(&workspace_id, &config.ai_peer_name),
            self.session(&workspace_id, cwd, &session_name),
        )?;
        Ok(Identities {
            workspace_id,
            user_peer_id,
            ai_peer_id,
            session_id,
            session_name,
            user_peer_name: config.user_peer_name.clone(),
            ai_peer_name: config.ai_peer_name.clone(),
        })
    }

    pub async fn workspace(&self, name: &str) -> Result<String, RemoteError> {
        if let Some(id) = self.cache.workspace_id(name) {
            return Ok(id);
        }
        let id = self.api.workspace(name).await?;
        debug!("identity_resolved: workspace {name} -> {id}");
        if let Err(err) = self.cache.set_workspace(name, &id) {
            warn!("identity_cache_write_failed: {err}");
        }
        Ok(id)
    }

    pub async fn peer(&self, workspace_id: &str, name: &str) -> Result<String, RemoteError> {
        if let Some(id) = self.cache.peer_id(workspace_id, name) {
            return Ok(id);
        }
        let id = self.api.peer(workspace_id, name).await?;
        debug!("identity_resolved: peer {name} -> {id}");
        if let Err(err) = self.cache.set_peer(workspace_id, name, &id) {
            warn!("identity_cache_write_failed: {err}");
        }
        Ok(id)
    }

    pub async fn session(
        &self,
        workspace_id: &str,
        cwd: &str,
        name: &str,
    ) -> Result<String, RemoteError> {
        if let Some(id) = self.cache.session_id(workspace_id, cwd, name) {
            return Ok(id);
        }
        let id = self.api.session(workspace_id, name).await?;
        debug!("identity_resolved: session {name} -> {id}");
        if let Err(err) = self.cache.set_session(workspace_id, cwd, name, &id) {
            warn!("identity_cache_write_failed: {err}");
        }
        Ok(id)
    }
}
