//! reqwest-backed [`MemoryApi`].
//!
//! Wire structs stay private to this module; responses are mapped to the
//! `memlink_core` types before they leave it.

use crate::api::{ContextRequest, MemoryApi, OutboundMessage};
use crate::RemoteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memlink_config::ResolvedConfig;
use memlink_core::{Conclusion, PeerContext, SearchHit, SessionSummary};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone)]
pub struct HttpMemoryClient {
    client: Client,
    base_url: Url,
    credential: String,
}

#[derive(Serialize)]
struct NameBody<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Serialize)]
struct ContextBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    max_conclusions: usize,
    include_representation: bool,
}

#[derive(Deserialize)]
struct ContextResponse {
    #[serde(default)]
    representation: Option<String>,
    #[serde(default)]
    conclusions: Vec<WireConclusion>,
}

#[derive(Deserialize)]
struct WireConclusion {
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    peer_id: &'a str,
    content: &'a str,
    metadata: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct SummariesResponse {
    #[serde(default)]
    summaries: Vec<WireSummary>,
}

#[derive(Deserialize)]
struct WireSummary {
    #[serde(default)]
    content: String,
    #[serde(default)]
    summary_type: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WireHit>,
}

#[derive(Deserialize)]
struct WireHit {
    #[serde(default)]
    content: String,
    #[serde(default)]
    peer_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ConclusionBody<'a> {
    content: &'a str,
}

impl HttpMemoryClient {
    pub fn new(base_url: Url, credential: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_timeout(base_url, credential, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: Url,
        credential: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credential: credential.into(),
        })
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, RemoteError> {
        Self::new(config.endpoint.base_url(), config.credential.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty().push("v1").extend(segments);
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let body = self.send_raw(request).await?;
        serde_json::from_slice(&body).map_err(|err| RemoteError::Decode(err.to_string()))
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<Vec<u8>, RemoteError> {
        let response = request.bearer_auth(&self.credential).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn create_named(&self, segments: &[&str], name: &str) -> Result<String, RemoteError> {
        let url = self.endpoint(segments)?;
        debug!("remote_get_or_create: {url} name={name}");
        let response: IdResponse = self
            .send(self.client.post(url).json(&NameBody { name }))
            .await?;
        Ok(response.id)
    }
}

#[async_trait]
impl MemoryApi for HttpMemoryClient {
    async fn workspace(&self, name: &str) -> Result<String, RemoteError> {
        self.create_named(&["workspaces"], name).await
    }

    async fn peer(&self, workspace_id: &str, name: &str) -> Result<String, RemoteError> {
        self.create_named(&["workspaces", workspace_id, "peers"], name)
            .await
    }

    async fn session(&self, workspace_id: &str, name: &str) -> Result<String, RemoteError> {
        self.create_named(&["workspaces", workspace_id, "sessions"], name)
            .await
    }

    async fn peer_context(
        &self,
        workspace_id: &str,
        peer_id: &str,
        request: &ContextRequest,
    ) -> Result<PeerContext, RemoteError> {
        let url = self.endpoint(&["workspaces", workspace_id, "peers", peer_id, "context"])?;
        let body = ContextBody {
            target: request.target.as_deref(),
            max_conclusions: request.max_conclusions,
            include_representation: request.include_representation,
        };
        let response: ContextResponse = self.send(self.client.post(url).json(&body)).await?;
        Ok(PeerContext {
            representation: response.representation,
            conclusions: response
                .conclusions
                .into_iter()
                .filter(|conclusion| !conclusion.content.trim().is_empty())
                .map(|conclusion| Conclusion {
                    content: conclusion.content,
                    created_at: conclusion.created_at,
                })
                .collect(),
        })
    }

    async fn chat(
        &self,
        workspace_id: &str,
        peer_id: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint(&["workspaces", workspace_id, "peers", peer_id, "chat"])?;
        let response: ChatResponse = self
            .send(self.client.post(url).json(&ChatBody { query, session_id }))
            .await?;
        Ok(response.content.unwrap_or_default())
    }

    async fn add_messages(
        &self,
        workspace_id: &str,
        session_id: &str,
        messages: &[OutboundMessage],
    ) -> Result<(), RemoteError> {
        if messages.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["workspaces", workspace_id, "sessions", session_id, "messages"])?;
        let body = MessagesBody {
            messages: messages
                .iter()
                .map(|message| WireMessage {
                    peer_id: &message.peer_id,
                    content: &message.content,
                    metadata: &message.metadata,
                })
                .collect(),
        };
        self.send_raw(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn session_summaries(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> Result<Vec<SessionSummary>, RemoteError> {
        let url = self.endpoint(&["workspaces", workspace_id, "sessions", session_id, "summaries"])?;
        let response: SummariesResponse = self.send(self.client.get(url)).await?;
        Ok(response
            .summaries
            .into_iter()
            .filter(|summary| !summary.content.trim().is_empty())
            .map(|summary| SessionSummary {
                content: summary.content,
                kind: summary.summary_type,
                created_at: summary.created_at,
            })
            .collect())
    }

    async fn search(
        &self,
        workspace_id: &str,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RemoteError> {
        let url = self.endpoint(&["workspaces", workspace_id, "sessions", session_id, "search"])?;
        let response: SearchResponse = self
            .send(self.client.post(url).json(&SearchBody { query, limit }))
            .await?;
        Ok(response
            .results
            .into_iter()
            .map(|hit| SearchHit {
                content: hit.content,
                peer_id: hit.peer_id,
                created_at: hit.created_at,
            })
            .collect())
    }

    async fn create_conclusion(
        &self,
        workspace_id: &str,
        peer_id: &str,
        content: &str,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["workspaces", workspace_id, "peers", peer_id, "conclusions"])?;
        self.send_raw(self.client.post(url).json(&ConclusionBody { content }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpMemoryClient {
        let base = Url::parse(&server.uri()).expect("server url");
        HttpMemoryClient::new(base, "mk-secret").expect("client")
    }

    #[test]
    fn endpoint_keeps_base_path_and_escapes_segments() {
        let base = Url::parse("https://api.example.com/memory/").expect("url");
        let client = HttpMemoryClient::new(base, "key").expect("client");
        let url = client
            .endpoint(&["workspaces", "ws 1", "peers"])
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/memory/v1/workspaces/ws%201/peers"
        );
    }

    #[tokio::test]
    async fn workspace_posts_name_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/workspaces"))
            .and(header("authorization", "Bearer mk-secret"))
            .and(body_json(json!({"name": "claude_code"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ws-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server)
            .workspace("claude_code")
            .await
            .expect("workspace");
        assert_eq!(id, "ws-1");
    }

    #[tokio::test]
    async fn peer_context_is_mapped_to_core_types() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/workspaces/ws-1/peers/peer-1/context"))
            .and(body_json(json!({
                "max_conclusions": 10,
                "include_representation": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "representation": "prefers small diffs",
                "conclusions": [
                    {"content": "writes rust", "created_at": "2026-01-02T03:04:05Z"},
                    {"content": "  "}
                ]
            })))
            .mount(&server)
            .await;

        let request = ContextRequest {
            max_conclusions: 10,
            ..ContextRequest::default()
        };
        let context = client(&server)
            .peer_context("ws-1", "peer-1", &request)
            .await
            .expect("context");
        assert_eq!(context.representation.as_deref(), Some("prefers small diffs"));
        assert_eq!(context.conclusions.len(), 1);
        assert_eq!(context.conclusions[0].content, "writes rust");
        assert!(context.conclusions[0].created_at.is_some());
    }

    #[tokio::test]
    async fn summaries_tolerate_missing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/workspaces/ws-1/sessions/s-1/summaries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "summaries": [{"content": "refactored the parser", "summary_type": "short"}]
            })))
            .mount(&server)
            .await;

        let summaries = client(&server)
            .session_summaries("ws-1", "s-1")
            .await
            .expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].kind, "short");
        assert_eq!(summaries[0].created_at, None);
    }

    #[tokio::test]
    async fn add_messages_sends_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/workspaces/ws-1/sessions/s-1/messages"))
            .and(body_json(json!({
                "messages": [
                    {"peer_id": "peer-1", "content": "hello", "metadata": {"cwd": "/work/a"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut metadata = Map::new();
        metadata.insert("cwd".to_string(), json!("/work/a"));
        let messages = vec![OutboundMessage {
            peer_id: "peer-1".to_string(),
            content: "hello".to_string(),
            metadata,
        }];
        client(&server)
            .add_messages("ws-1", "s-1", &messages)
            .await
            .expect("add messages");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/workspaces/ws-1/peers/peer-1/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server)
            .chat("ws-1", "peer-1", "what next?", None)
            .await
            .expect_err("503 must fail");
        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/workspaces/ws-1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server)
            .session("ws-1", "jane-app")
            .await
            .expect_err("decode must fail");
        assert!(matches!(err, RemoteError::Decode(_)));
    }
}
