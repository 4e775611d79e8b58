use crate::invocation::InvocationContext;
use anyhow::{anyhow, bail, Context, Result};
use memlink_config::env::{parse_bool_env, EnvSource, ProcessEnv, WithoutOverrides};
use memlink_config::{
    load_config, load_config_with_env, save_config, session_name, EndpointSelection,
    ResolvedConfig,
};
use memlink_remote::{HttpMemoryClient, Identities, IdentityResolver, MemoryApi, Uploader};
use memlink_storage::{ContextCache, GitStateStore, IdentityCache, MessageQueue, WorkLog};

const PREVIEW_CHARS: usize = 80;

pub const SETTING_KEYS: [&str; 12] = [
    "api-key",
    "peer-name",
    "workspace",
    "ai-peer",
    "endpoint",
    "save-messages",
    "enabled",
    "logging",
    "session",
    "context-ttl",
    "refresh-threshold",
    "work-log-max",
];

pub fn status(ctx: &InvocationContext) -> Result<()> {
    let config = load_config(&ctx.cache_dir, ctx.host);
    println!("cache dir: {}", ctx.cache_dir.root().display());
    println!("host: {}", ctx.host);
    println!("cwd: {}", ctx.cwd);
    match &config {
        Some(config) => {
            println!("configured: yes ({})", config.masked_credential());
            println!("enabled: {}", config.enabled);
            println!("workspace: {}", config.workspace_name);
            println!("session: {}", session_name(config, &ctx.cwd));
        }
        None => println!("configured: no"),
    }

    let queue = MessageQueue::new(&ctx.cache_dir);
    let here = queue.list_pending(Some(&ctx.cwd))?.len();
    let total = queue.list_pending(None)?.len();
    println!("queued: {here} here, {total} total");

    let refresh = config.as_ref().map(|config| config.refresh).unwrap_or_default();
    let cache = ContextCache::new(&ctx.cache_dir, refresh);
    println!(
        "activity: {} message(s), refresh due: {}",
        cache.message_count(),
        cache.should_force_refresh()
    );

    if let Some(config) = &config {
        let identity = IdentityCache::new(&ctx.cache_dir);
        let record = identity
            .workspace_id(&config.workspace_name)
            .and_then(|workspace_id| identity.session(&workspace_id, &ctx.cwd));
        if let Some(record) = record {
            println!("remote session: {} ({})", record.name, record.id);
        }
    }
    if let Some(git) = GitStateStore::new(&ctx.cache_dir).load(&ctx.cwd) {
        let dirty = if git.is_dirty { ", dirty" } else { "" };
        println!("git: {} at {}{dirty}", git.branch, git.commit);
    }
    Ok(())
}

pub fn config_show(ctx: &InvocationContext) -> Result<()> {
    let config = require_config(ctx)?;
    println!("host: {}", config.host);
    println!("api-key: {}", config.masked_credential());
    println!("peer-name: {}", config.user_peer_name);
    println!("workspace: {}", config.workspace_name);
    println!("ai-peer: {}", config.ai_peer_name);
    println!("endpoint: {}", config.endpoint);
    println!("save-messages: {}", config.save_messages);
    println!("enabled: {}", config.enabled);
    println!("logging: {}", config.logging);
    println!("context-ttl: {}", config.refresh.ttl_seconds);
    println!("refresh-threshold: {}", config.refresh.message_threshold);
    println!("work-log-max: {}", config.work_log_max_entries);
    println!("session: {}", session_name(&config, &ctx.cwd));
    Ok(())
}

/// Edits the file-backed config. `MEMLINK_*` overrides are not folded in, so
/// they never end up persisted.
pub fn config_set(ctx: &InvocationContext, key: &str, value: &str) -> Result<()> {
    config_set_with_env(ctx, key, value, &ProcessEnv)
}

pub fn config_set_with_env(
    ctx: &InvocationContext,
    key: &str,
    value: &str,
    env: &impl EnvSource,
) -> Result<()> {
    let file_only = WithoutOverrides(env);
    let mut config = match load_config_with_env(&ctx.cache_dir, ctx.host, &file_only) {
        Some(config) => config,
        None if key == "api-key" => {
            let user = env.non_empty("USER").unwrap_or_else(|| "user".to_string());
            ResolvedConfig::with_defaults(value.trim(), ctx.host, user)
        }
        None => bail!("memlink is not configured; run `memlink config set api-key <key>` first"),
    };
    apply_setting(&mut config, key, value, &ctx.cwd)?;
    save_config(&ctx.cache_dir, &config).context("save config")?;
    println!("{key} updated");
    Ok(())
}

pub fn apply_setting(
    config: &mut ResolvedConfig,
    key: &str,
    value: &str,
    cwd: &str,
) -> Result<()> {
    let value = value.trim();
    match key {
        "api-key" => config.credential = non_empty(key, value)?,
        "peer-name" => config.user_peer_name = non_empty(key, value)?,
        "workspace" => config.workspace_name = non_empty(key, value)?,
        "ai-peer" => config.ai_peer_name = non_empty(key, value)?,
        "endpoint" => config.endpoint = value.parse::<EndpointSelection>()?,
        "save-messages" => config.save_messages = parse_flag(key, value)?,
        "enabled" => config.enabled = parse_flag(key, value)?,
        "logging" => config.logging = parse_flag(key, value)?,
        "session" => {
            if value.is_empty() {
                config.session_overrides.remove(cwd);
            } else {
                config
                    .session_overrides
                    .insert(cwd.to_string(), value.to_string());
            }
        }
        "context-ttl" => config.refresh.ttl_seconds = parse_number(key, value)?,
        "refresh-threshold" => {
            config.refresh.message_threshold = parse_number::<u64>(key, value)?.max(1)
        }
        "work-log-max" => config.work_log_max_entries = parse_number::<usize>(key, value)?.max(1),
        other => bail!(
            "unknown setting {other:?}; expected one of: {}",
            SETTING_KEYS.join(", ")
        ),
    }
    Ok(())
}

pub fn queue_list(ctx: &InvocationContext, all: bool) -> Result<()> {
    let queue = MessageQueue::new(&ctx.cache_dir);
    let scope = if all { None } else { Some(ctx.cwd.as_str()) };
    let pending = queue.list_pending(scope)?;
    if pending.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    for message in &pending {
        println!(
            "{} {} [{}] {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message.cwd,
            message.peer_id,
            preview(&message.content)
        );
    }
    println!("{} pending", pending.len());
    Ok(())
}

pub async fn queue_flush(ctx: &InvocationContext) -> Result<()> {
    let config = require_config(ctx)?;
    let api = HttpMemoryClient::from_config(&config)?;
    let ids = resolve(ctx, &config, &api).await?;
    let queue = MessageQueue::new(&ctx.cache_dir);
    let report = Uploader::new(&api, &queue).flush(&ids, &ctx.cwd).await?;
    println!(
        "uploaded {} record(s) as {} message(s) in {} request(s)",
        report.records, report.messages, report.batches
    );
    Ok(())
}

pub fn cache_clear(ctx: &InvocationContext) -> Result<()> {
    let removed = ctx.cache_dir.clear_all()?;
    if removed.is_empty() {
        println!("nothing to clear");
    }
    for path in removed {
        println!("removed {}", path.display());
    }
    Ok(())
}

pub async fn ask(ctx: &InvocationContext, query: &str) -> Result<()> {
    let config = require_config(ctx)?;
    let api = HttpMemoryClient::from_config(&config)?;
    let ids = resolve(ctx, &config, &api).await?;
    let answer = api
        .chat(&ids.workspace_id, &ids.user_peer_id, query, Some(&ids.session_id))
        .await?;
    if answer.trim().is_empty() {
        println!("(no answer)");
    } else {
        println!("{}", answer.trim());
    }
    Ok(())
}

pub async fn search(ctx: &InvocationContext, query: &str, limit: usize) -> Result<()> {
    let config = require_config(ctx)?;
    let api = HttpMemoryClient::from_config(&config)?;
    let ids = resolve(ctx, &config, &api).await?;
    let hits = api
        .search(&ids.workspace_id, &ids.session_id, query, limit)
        .await?;
    if hits.is_empty() {
        println!("no matches");
    }
    for hit in hits {
        let when = hit
            .created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{when} {}", preview(&hit.content));
    }
    Ok(())
}

pub async fn remember(ctx: &InvocationContext, text: &str) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        bail!("nothing to remember");
    }
    let config = require_config(ctx)?;
    let api = HttpMemoryClient::from_config(&config)?;
    let ids = resolve(ctx, &config, &api).await?;
    api.create_conclusion(&ids.workspace_id, &ids.user_peer_id, text)
        .await?;
    let refresh = ContextCache::new(&ctx.cache_dir, config.refresh);
    refresh.invalidate(&memlink_remote::assemble::cache_key(&ids))?;
    println!("remembered");
    Ok(())
}

pub fn work_log(ctx: &InvocationContext, limit: usize) -> Result<()> {
    let entries = WorkLog::new(&ctx.cache_dir, usize::MAX).recent(limit)?;
    if entries.is_empty() {
        println!("work log is empty");
    }
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}

fn require_config(ctx: &InvocationContext) -> Result<ResolvedConfig> {
    load_config(&ctx.cache_dir, ctx.host).ok_or_else(|| {
        anyhow!("memlink is not configured; set MEMLINK_API_KEY or run `memlink config set api-key <key>`")
    })
}

async fn resolve<A: MemoryApi + ?Sized>(
    ctx: &InvocationContext,
    config: &ResolvedConfig,
    api: &A,
) -> Result<Identities> {
    IdentityResolver::new(api, &ctx.cache_dir)
        .resolve(config, &ctx.cwd)
        .await
        .context("resolve remote identities")
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{key} cannot be empty");
    }
    Ok(value.to_string())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    parse_bool_env(value).ok_or_else(|| anyhow!("{key} expects true/false, got {value:?}"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| anyhow!("{key} expects a non-negative number, got {value:?}"))
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut short: String = flat.chars().take(PREVIEW_CHARS).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlink_config::config_exists;
    use memlink_core::HostId;
    use memlink_storage::{CacheDir, CONFIG_FILE};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config() -> ResolvedConfig {
        ResolvedConfig::with_defaults("mk-test", HostId::Cursor, "jane")
    }

    #[test]
    fn settings_update_the_matching_field() {
        let mut config = config();
        apply_setting(&mut config, "workspace", " team ", "/work/app").expect("workspace");
        apply_setting(&mut config, "save-messages", "off", "/work/app").expect("flag");
        apply_setting(&mut config, "refresh-threshold", "0", "/work/app").expect("threshold");
        apply_setting(&mut config, "endpoint", "local", "/work/app").expect("endpoint");
        apply_setting(&mut config, "session", "pairing", "/work/app").expect("session");

        assert_eq!(config.workspace_name, "team");
        assert!(!config.save_messages);
        assert_eq!(config.refresh.message_threshold, 1);
        assert_eq!(config.endpoint, EndpointSelection::Local);
        assert_eq!(session_name(&config, "/work/app"), "pairing");

        apply_setting(&mut config, "session", "", "/work/app").expect("clear session");
        assert_eq!(session_name(&config, "/work/app"), "jane-app");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = config();
        assert!(apply_setting(&mut config, "enabled", "maybe", "/w").is_err());
        assert!(apply_setting(&mut config, "context-ttl", "-5", "/w").is_err());
        assert!(apply_setting(&mut config, "peer-name", "  ", "/w").is_err());
        assert!(apply_setting(&mut config, "colour", "blue", "/w").is_err());
        assert_eq!(config, self::config());
    }

    #[test]
    fn first_setting_must_be_the_api_key() {
        let dir = TempDir::new().expect("temp dir");
        let ctx = InvocationContext::new(CacheDir::new(dir.path()), "/work/app", HostId::Codex);

        assert!(config_set(&ctx, "workspace", "team").is_err());
        assert!(!config_exists(&ctx.cache_dir));

        config_set(&ctx, "api-key", "mk-0123456789").expect("api key");
        config_set(&ctx, "workspace", "team").expect("workspace");

        let file_only = BTreeMap::<String, String>::new();
        let saved = load_config_with_env(&ctx.cache_dir, HostId::Codex, &file_only)
            .expect("configured");
        assert_eq!(saved.credential, "mk-0123456789");
        assert_eq!(saved.workspace_name, "team");
        assert_eq!(saved.ai_peer_name, "codex");
    }

    #[test]
    fn config_set_keeps_the_login_name_and_skips_overrides() {
        let dir = TempDir::new().expect("temp dir");
        let ctx = InvocationContext::new(CacheDir::new(dir.path()), "/work/app", HostId::Cursor);
        ctx.cache_dir.ensure().expect("ensure");
        std::fs::write(ctx.cache_dir.path(CONFIG_FILE), r#"{"apiKey":"mk-123"}"#)
            .expect("seed config");
        let env: BTreeMap<String, String> = [
            ("USER", "jane"),
            ("MEMLINK_AI_PEER", "override-bot"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        config_set_with_env(&ctx, "workspace", "team", &env).expect("workspace");

        let saved = load_config_with_env(&ctx.cache_dir, HostId::Cursor, &env).expect("saved");
        assert_eq!(saved.user_peer_name, "jane");
        assert_eq!(saved.workspace_name, "team");
        assert_eq!(session_name(&saved, "/work/app"), "jane-app");

        let raw = std::fs::read_to_string(ctx.cache_dir.path(CONFIG_FILE)).expect("read");
        assert!(!raw.contains("override-bot"));
        assert!(!raw.contains("\"user\""));
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b"), "a b");
        let long = "x".repeat(100);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 3);
    }
}
