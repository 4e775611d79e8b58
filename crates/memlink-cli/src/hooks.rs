//! Host lifecycle hooks.
//!
//! Every handler persists locally before it talks to the network, and no
//! remote failure turns into a hook failure: the host is never blocked.

use crate::invocation::InvocationContext;
use anyhow::{Context, Result};
use clap::Subcommand;
use memlink_config::{session_name, ResolvedConfig};
use memlink_core::GitStateChange;
use memlink_remote::{
    ContextAssembler, Identities, IdentityResolver, MemoryApi, Uploader, DEFAULT_MAX_CONCLUSIONS,
};
use memlink_storage::{ContextCache, GitStateStore, MessageQueue, WorkLog};
use serde::Deserialize;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    /// A new host session opened
    SessionStart,
    /// The user submitted a prompt
    UserPrompt,
    /// The assistant finished a reply
    AssistantStop,
    /// The host session is closing
    SessionEnd,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::SessionStart => "session-start",
            HookEvent::UserPrompt => "user-prompt",
            HookEvent::AssistantStop => "assistant-stop",
            HookEvent::SessionEnd => "session-end",
        }
    }
}

/// JSON the host writes to stdin. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HookPayload {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, alias = "lastAssistantMessage")]
    pub last_assistant_message: Option<String>,
}

pub fn parse_payload(raw: &str) -> HookPayload {
    if raw.trim().is_empty() {
        return HookPayload::default();
    }
    match serde_json::from_str(raw) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("hook_payload_invalid: {err}");
            HookPayload::default()
        }
    }
}

pub fn read_payload() -> HookPayload {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return HookPayload::default();
    }
    let mut raw = String::new();
    if let Err(err) = stdin.read_to_string(&mut raw) {
        warn!("hook_payload_read_failed: {err}");
        return HookPayload::default();
    }
    parse_payload(&raw)
}

pub struct Hooks<'a, A: ?Sized> {
    ctx: &'a InvocationContext,
    config: &'a ResolvedConfig,
    api: &'a A,
    queue: MessageQueue,
    context_cache: ContextCache,
    work_log: WorkLog,
}

impl<'a, A: MemoryApi + ?Sized> Hooks<'a, A> {
    pub fn new(ctx: &'a InvocationContext, config: &'a ResolvedConfig, api: &'a A) -> Self {
        Self {
            ctx,
            config,
            api,
            queue: MessageQueue::new(&ctx.cache_dir),
            context_cache: ContextCache::new(&ctx.cache_dir, config.refresh),
            work_log: WorkLog::new(&ctx.cache_dir, config.work_log_max_entries),
        }
    }

    /// Text for the host's stdout, if the event produced any.
    pub async fn run(&self, event: HookEvent, payload: &HookPayload) -> Result<Option<String>> {
        self.ctx
            .cache_dir
            .ensure()
            .context("create cache directory")?;
        debug!(
            "hook_start: {} cwd={} host_session={}",
            event.as_str(),
            self.ctx.cwd,
            payload.session_id.as_deref().unwrap_or("-")
        );
        match event {
            HookEvent::SessionStart => self.session_start().await,
            HookEvent::UserPrompt => self.user_prompt(payload.prompt.as_deref()).await,
            HookEvent::AssistantStop => {
                self.assistant_stop(payload.last_assistant_message.as_deref())
                    .await
            }
            HookEvent::SessionEnd => self.session_end().await,
        }
    }

    async fn session_start(&self) -> Result<Option<String>> {
        self.context_cache
            .reset_session()
            .context("reset activity counter")?;

        let changes = self.track_git()?;
        for change in &changes {
            self.work_log
                .append(&format!("{}: {}", self.ctx.cwd, change.description))
                .context("append work log")?;
            self.enqueue(&format!("[git] {}", change.description), &self.config.user_peer_name)?;
        }

        let mut sections = Vec::new();
        if !changes.is_empty() {
            let lines = changes
                .iter()
                .map(|change| format!("- {}", change.description))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("## Repository\n{lines}"));
        }

        if let Some(ids) = self.identities().await {
            self.flush(&ids).await;
            let assembled = ContextAssembler::new(self.api, &self.context_cache)
                .assemble(&ids, false)
                .await;
            if !assembled.is_empty() {
                sections.insert(
                    0,
                    format!(
                        "[memlink] workspace {}, session {}",
                        self.config.workspace_name, ids.session_name
                    ),
                );
                sections.push(assembled.render(DEFAULT_MAX_CONCLUSIONS));
            }
        }

        Ok(Some(sections.join("\n\n")).filter(|output| !output.is_empty()))
    }

    async fn user_prompt(&self, prompt: Option<&str>) -> Result<Option<String>> {
        let Some(prompt) = prompt.filter(|prompt| !prompt.trim().is_empty()) else {
            return Ok(None);
        };
        self.enqueue(prompt, &self.config.user_peer_name)?;
        let count = self
            .context_cache
            .increment_message_count()
            .context("count message")?;
        debug!("activity_counted: {count}");

        let Some(ids) = self.identities().await else {
            return Ok(None);
        };
        self.flush(&ids).await;

        if !self.context_cache.should_force_refresh() {
            return Ok(None);
        }
        let assembled = ContextAssembler::new(self.api, &self.context_cache)
            .assemble(&ids, true)
            .await;
        if assembled.is_empty() {
            return Ok(None);
        }
        Ok(Some(assembled.render(DEFAULT_MAX_CONCLUSIONS)))
    }

    async fn assistant_stop(&self, reply: Option<&str>) -> Result<Option<String>> {
        let Some(reply) = reply.filter(|reply| !reply.trim().is_empty()) else {
            return Ok(None);
        };
        self.enqueue(reply, &self.config.ai_peer_name)?;
        if let Some(ids) = self.identities().await {
            self.flush(&ids).await;
        }
        Ok(None)
    }

    async fn session_end(&self) -> Result<Option<String>> {
        let name = session_name(self.config, &self.ctx.cwd);
        let messages = self.context_cache.message_count();
        self.work_log
            .append(&format!(
                "Session {name} ended in {} after {messages} message(s)",
                self.ctx.cwd
            ))
            .context("append work log")?;
        if let Some(ids) = self.identities().await {
            self.flush(&ids).await;
        }
        Ok(None)
    }

    fn enqueue(&self, content: &str, peer_name: &str) -> Result<()> {
        if !self.config.save_messages {
            return Ok(());
        }
        self.queue
            .enqueue(
                content,
                peer_name,
                &self.ctx.cwd,
                Some(&self.ctx.instance_id),
            )
            .context("enqueue message")?;
        Ok(())
    }

    fn track_git(&self) -> Result<Vec<GitStateChange>> {
        let store = GitStateStore::new(&self.ctx.cache_dir);
        let tracked = memlink_git::track(&store, Path::new(&self.ctx.cwd))
            .context("store git state")?;
        Ok(tracked.map(|tracked| tracked.changes).unwrap_or_default())
    }

    async fn identities(&self) -> Option<Identities> {
        match IdentityResolver::new(self.api, &self.ctx.cache_dir)
            .resolve(self.config, &self.ctx.cwd)
            .await
        {
            Ok(ids) => Some(ids),
            Err(err) => {
                warn!("identity_resolve_failed: {err}");
                None
            }
        }
    }

    async fn flush(&self, ids: &Identities) {
        if let Err(err) = Uploader::new(self.api, &self.queue)
            .flush(ids, &self.ctx.cwd)
            .await
        {
            warn!("queue_flush_failed: {err}");
        }
    }
}
