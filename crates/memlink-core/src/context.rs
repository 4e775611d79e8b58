//! Typed shapes of what the remote memory API returns.
//!
//! Responses are decoded into these once at the client edge; consumers never
//! see raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A derived fact the remote system holds about a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conclusion {
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Representation plus top conclusions for one peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerContext {
    #[serde(default)]
    pub representation: Option<String>,
    #[serde(default)]
    pub conclusions: Vec<Conclusion>,
}

impl PeerContext {
    pub fn is_empty(&self) -> bool {
        self.representation
            .as_deref()
            .map_or(true, |value| value.trim().is_empty())
            && self.conclusions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub content: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub content: String,
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Context assembled for a hook. Every section is independently optional: a
/// failed fetch leaves its section empty instead of failing the whole result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssembledContext {
    #[serde(default)]
    pub peer_context: Option<PeerContext>,
    #[serde(default)]
    pub dialectic: Option<String>,
    #[serde(default)]
    pub summaries: Vec<SessionSummary>,
    #[serde(skip)]
    pub from_cache: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.peer_context
            .as_ref()
            .map_or(true, PeerContext::is_empty)
            && self
                .dialectic
                .as_deref()
                .map_or(true, |value| value.trim().is_empty())
            && self.summaries.is_empty()
    }

    /// Plain-text rendering injected into the host's context window.
    pub fn render(&self, max_conclusions: usize) -> String {
        let mut sections = Vec::new();

        if let Some(peer) = &self.peer_context {
            if let Some(representation) = peer
                .representation
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                sections.push(format!("## About the user\n{representation}"));
            }
            if !peer.conclusions.is_empty() {
                let lines = peer
                    .conclusions
                    .iter()
                    .take(max_conclusions)
                    .map(|conclusion| format!("- {}", conclusion.content.trim()))
                    .collect::<Vec<_>>()
                    .join("\n");
                sections.push(format!("## Known facts\n{lines}"));
            }
        }

        if let Some(dialectic) = self
            .dialectic
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            sections.push(format!("## Recent focus\n{dialectic}"));
        }

        if let Some(summary) = self.summaries.first() {
            sections.push(format!("## Previous session\n{}", summary.content.trim()));
        }

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_context_decodes_with_missing_fields() {
        let peer: PeerContext = serde_json::from_str("{}").expect("decode");
        assert!(peer.is_empty());

        let peer: PeerContext = serde_json::from_str(
            r#"{"representation":"likes rust","conclusions":[{"content":"uses vim"}]}"#,
        )
        .expect("decode");
        assert_eq!(peer.representation.as_deref(), Some("likes rust"));
        assert_eq!(peer.conclusions.len(), 1);
    }

    #[test]
    fn render_skips_missing_sections() {
        let context = AssembledContext {
            peer_context: None,
            dialectic: Some("refactoring the parser".to_string()),
            summaries: Vec::new(),
            from_cache: false,
        };
        let rendered = context.render(10);
        assert_eq!(rendered, "## Recent focus\nrefactoring the parser");
        assert!(!context.is_empty());
        assert!(AssembledContext::default().is_empty());
    }

    #[test]
    fn render_caps_conclusions() {
        let context = AssembledContext {
            peer_context: Some(PeerContext {
                representation: Some("  ".to_string()),
                conclusions: (0..5)
                    .map(|index| Conclusion {
                        content: format!("fact {index}"),
                        created_at: None,
                    })
                    .collect(),
            }),
            ..AssembledContext::default()
        };
        let rendered = context.render(2);
        assert_eq!(rendered, "## Known facts\n- fact 0\n- fact 1");
    }

    #[test]
    fn cache_origin_is_not_persisted() {
        let context = AssembledContext {
            dialectic: Some("shipping the cli".to_string()),
            from_cache: true,
            ..AssembledContext::default()
        };
        let value = serde_json::to_value(&context).expect("serialize");
        assert!(value.get("fromCache").is_none());
        let restored: AssembledContext = serde_json::from_value(value).expect("deserialize");
        assert!(!restored.from_cache);
        assert_eq!(restored.dialectic, context.dialectic);
    }
}
