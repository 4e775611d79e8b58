use crate::RemoteError;
use async_trait::async_trait;
use memlink_core::{PeerContext, SearchHit, SessionSummary};
use serde_json::{Map, Value};

/// One message to append to a remote session.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub peer_id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// Shape of a peer context fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    /// Peer whose view of `peer` is requested; `None` for the global view.
    pub target: Option<String>,
    pub max_conclusions: usize,
    pub include_representation: bool,
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self {
            target: None,
            max_conclusions: crate::DEFAULT_MAX_CONCLUSIONS,
            include_representation: true,
        }
    }
}

/// Capabilities of the remote memory service.
///
/// `workspace`, `peer` and `session` are get-or-create by name and return the
/// remote ID.
#[async_trait]
pub trait MemoryApi: Send + Sync {
    async fn workspace(&self, name: &str) -> Result<String, RemoteError>;

    async fn peer(&self, workspace_id: &str, name: &str) -> Result<String, RemoteError>;

    async fn session(&self, workspace_id: &str, name: &str) -> Result<String, RemoteError>;

    async fn peer_context(
        &self,
        workspace_id: &str,
        peer_id: &str,
        request: &ContextRequest,
    ) -> Result<PeerContext, RemoteError>;

    /// Dialectic query answered from what the service knows about `peer_id`.
    async fn chat(
        &self,
        workspace_id: &str,
        peer_id: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<String, RemoteError>;

    async fn add_messages(
        &self,
        workspace_id: &str,
        session_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), RemoteError>;

    /// Newest first.
    async fn session_summaries(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> Result<Vec<SessionSummary>, RemoteError>;

    async fn search(
        &self,
        workspace_id: &str,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RemoteError>;

    async fn create_conclusion(
        &self,
        workspace_id: &str,
        peer_id: &str,
        content: &str,
    ) -> Result<(), RemoteError>;
}
