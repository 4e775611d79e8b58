use chrono::{Duration, Utc};
use memlink_core::{RefreshPolicy, SessionSummary};
use memlink_storage::{
    CacheDir, ContextCache, IdentityCache, MessageQueue, WorkLog, CONTEXT_CACHE_FILE,
    IDENTITY_CACHE_FILE, WORK_LOG_FILE,
};
use std::fs;
use tempfile::TempDir;

fn summary(content: &str) -> Vec<SessionSummary> {
    vec![SessionSummary {
        content: content.to_string(),
        kind: "short".to_string(),
        created_at: None,
    }]
}

#[test]
fn state_written_by_one_instance_is_seen_by_the_next() {
    let dir = TempDir::new().expect("temp dir");
    let cache_dir = CacheDir::new(dir.path());

    {
        let identity = IdentityCache::new(&cache_dir);
        identity.set_workspace("claude_code", "ws-1").expect("workspace");
        identity.set_peer("ws-1", "jane", "peer-1").expect("peer");
        let context = ContextCache::new(&cache_dir, RefreshPolicy::default());
        context.set("ws-1:peer-1", &summary("wired the queue")).expect("set");
        context.increment_message_count().expect("count");
        MessageQueue::new(&cache_dir)
            .enqueue("hello", "jane", "/work/app", None)
            .expect("enqueue");
    }

    let identity = IdentityCache::new(&cache_dir);
    assert_eq!(identity.workspace_id("claude_code").as_deref(), Some("ws-1"));
    assert_eq!(identity.peer_id("ws-1", "jane").as_deref(), Some("peer-1"));
    let context = ContextCache::new(&cache_dir, RefreshPolicy::default());
    assert_eq!(context.message_count(), 1);
    assert_eq!(
        context.get::<Vec<SessionSummary>>("ws-1:peer-1"),
        Some(summary("wired the queue"))
    );
    assert_eq!(
        MessageQueue::new(&cache_dir)
            .list_pending(Some("/work/app"))
            .expect("list")
            .len(),
        1
    );
}

#[test]
fn corrupt_caches_recover_as_empty_and_are_rewritten() {
    let dir = TempDir::new().expect("temp dir");
    let cache_dir = CacheDir::new(dir.path());
    cache_dir.ensure().expect("ensure");
    fs::write(cache_dir.path(IDENTITY_CACHE_FILE), "{\"workspace\":").expect("corrupt");
    fs::write(cache_dir.path(CONTEXT_CACHE_FILE), "[]").expect("wrong shape");

    let identity = IdentityCache::new(&cache_dir);
    assert_eq!(identity.workspace_id("claude_code"), None);
    identity.set_workspace("claude_code", "ws-2").expect("rewrite");
    assert_eq!(identity.workspace_id("claude_code").as_deref(), Some("ws-2"));

    let context = ContextCache::new(&cache_dir, RefreshPolicy::default());
    assert_eq!(context.message_count(), 0);
    assert_eq!(context.increment_message_count().expect("count"), 1);
}

#[test]
fn switching_workspace_keeps_ids_of_the_previous_one() {
    let dir = TempDir::new().expect("temp dir");
    let identity = IdentityCache::new(&CacheDir::new(dir.path()));
    identity.set_workspace("claude_code", "ws-1").expect("workspace");
    identity.set_peer("ws-1", "jane", "peer-1").expect("peer");
    identity
        .set_session("ws-1", "/work/app", "jane-app", "sess-1")
        .expect("session");

    identity.set_workspace("team", "ws-9").expect("switch");
    assert_eq!(identity.peer_id("ws-9", "jane"), None);
    assert_eq!(identity.session("ws-9", "/work/app"), None);

    let reopened = IdentityCache::new(&CacheDir::new(dir.path()));
    assert_eq!(reopened.workspace_id("claude_code").as_deref(), Some("ws-1"));
    assert_eq!(reopened.peer_id("ws-1", "jane").as_deref(), Some("peer-1"));
    assert_eq!(
        reopened.session_id("ws-1", "/work/app", "jane-app").as_deref(),
        Some("sess-1")
    );
}

#[test]
fn clear_all_leaves_history_and_expired_entries_stay_hidden() {
    let dir = TempDir::new().expect("temp dir");
    let cache_dir = CacheDir::new(dir.path());
    let work_log = WorkLog::new(&cache_dir, 10);
    work_log.append("started the storage crate").expect("log");

    let context = ContextCache::new(&cache_dir, RefreshPolicy::default());
    let old = Utc::now() - Duration::seconds(301);
    context.set_at("ws:peer", &summary("old"), old).expect("set");
    assert_eq!(context.get::<Vec<SessionSummary>>("ws:peer"), None);

    cache_dir.clear_all().expect("clear");
    assert!(cache_dir.path(WORK_LOG_FILE).exists());
    assert_eq!(work_log.recent(5).expect("recent").len(), 1);
    assert_eq!(context.message_count(), 0);
}
