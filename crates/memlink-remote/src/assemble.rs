//! Context assembly: cache first, then three independent remote fetches.

use crate::api::{ContextRequest, MemoryApi};
use crate::identity::Identities;
use crate::RemoteError;
use futures_util::future::join3;
use memlink_core::AssembledContext;
use memlink_storage::ContextCache;
use tracing::{debug, warn};

pub const DEFAULT_MAX_CONCLUSIONS: usize = 25;
pub const DEFAULT_DIALECTIC_QUERY: &str =
    "What is the user working on right now, and what should an assistant keep in mind?";

pub struct ContextAssembler<'a, A: ?Sized> {
    api: &'a A,
    cache: &'a ContextCache,
    request: ContextRequest,
    dialectic_query: String,
}

impl<'a, A: MemoryApi + ?Sized> ContextAssembler<'a, A> {
    pub fn new(api: &'a A, cache: &'a ContextCache) -> Self {
        Self {
            api,
            cache,
            request: ContextRequest::default(),
            dialectic_query: DEFAULT_DIALECTIC_QUERY.to_string(),
        }
    }

    pub fn with_request(mut self, request: ContextRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_dialectic_query(mut self, query: impl Into<String>) -> Self {
        self.dialectic_query = query.into();
        self
    }

    /// Cached context unless `force` is set or the cache is stale. A section
    /// whose fetch fails is left empty; the call itself never fails.
    pub async fn assemble(&self, ids: &Identities, force: bool) -> AssembledContext {
        let key = cache_key(ids);
        if !force {
            if let Some(mut cached) = self.cache.get::<AssembledContext>(&key) {
                debug!("context_cache_hit: {key}");
                cached.from_cache = true;
                return cached;
            }
        }

        let (peer_context, dialectic, summaries) = join3(
            self.api
                .peer_context(&ids.workspace_id, &ids.user_peer_id, &self.request),
            self.api.chat(
                &ids.workspace_id,
                &ids.user_peer_id,
                &self.dialectic_query,
                Some(&ids.session_id),
            ),
            self.api
                .session_summaries(&ids.workspace_id, &ids.session_id),
        )
        .await;

        let peer_fetched = peer_context.is_ok();
        let assembled = AssembledContext {
            peer_context: section("peer_context", peer_context),
            dialectic: section("dialectic", dialectic).filter(|value| !value.trim().is_empty()),
            summaries: section("summaries", summaries).unwrap_or_default(),
            from_cache: false,
        };

        if peer_fetched {
            if let Err(err) = self.cache.set(&key, &assembled) {
                warn!("context_cache_write_failed: {err}");
            } else if let Err(err) = self.cache.mark_refreshed() {
                warn!("context_cache_write_failed: {err}");
            }
        }
        assembled
    }
}

pub fn cache_key(ids: &Identities) -> String {
    format!("{}:{}", ids.workspace_id, ids.user_peer_id)
}

fn section<T>(label: &str, result: Result<T, RemoteError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("context_fetch_failed: {label}: {err}");
            None
        }
    }
}
