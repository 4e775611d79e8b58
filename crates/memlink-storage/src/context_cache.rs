//! Last fetched remote context per subject (`context-cache.json`).
//!
//! An entry is served only while it is younger than the TTL and fewer than
//! `message_threshold` messages have been counted since the last refresh.
//! The counter is monotonic for a session; [`ContextCache::reset_session`] is
//! the only thing that rewinds it.

use crate::{read_json_or_default, write_json_atomic, CacheDir, StorageError, CONTEXT_CACHE_FILE};
use chrono::{DateTime, Duration, Utc};
use memlink_core::RefreshPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ContextEntry {
    payload: Value,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ContextCacheFile {
    #[serde(default)]
    entries: BTreeMap<String, ContextEntry>,
    #[serde(default)]
    message_count: u64,
    #[serde(default)]
    last_refresh_count: u64,
}

impl ContextCacheFile {
    fn messages_since_refresh(&self) -> u64 {
        self.message_count.saturating_sub(self.last_refresh_count)
    }
}

pub struct ContextCache {
    path: PathBuf,
    policy: RefreshPolicy,
}

impl ContextCache {
    pub fn new(cache_dir: &CacheDir, policy: RefreshPolicy) -> Self {
        Self {
            path: cache_dir.path(CONTEXT_CACHE_FILE),
            policy,
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn get<T: DeserializeOwned>(&self, subject: &str) -> Option<T> {
        self.get_at(subject, Utc::now())
    }

    /// Same as [`ContextCache::get`] evaluated at `now`.
    pub fn get_at<T: DeserializeOwned>(&self, subject: &str, now: DateTime<Utc>) -> Option<T> {
        let file = self.load();
        let entry = file.entries.get(subject)?;

        // A TTL too large for chrono never expires.
        let ttl = i64::try_from(self.policy.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds);
        if ttl.is_some_and(|ttl| now.signed_duration_since(entry.fetched_at) >= ttl) {
            debug!("context_cache_stale: subject={subject} reason=ttl");
            return None;
        }
        if file.messages_since_refresh() >= self.policy.message_threshold {
            debug!("context_cache_stale: subject={subject} reason=activity");
            return None;
        }

        match serde_json::from_value(entry.payload.clone()) {
            Ok(payload) => Some(payload),
            Err(err) => {
                debug!("context_cache_payload_mismatch: subject={subject}: {err}");
                None
            }
        }
    }

    /// Overwrites the payload and fetch time. Counter and baseline are untouched.
    pub fn set<T: Serialize>(&self, subject: &str, payload: &T) -> Result<(), StorageError> {
        self.set_at(subject, payload, Utc::now())
    }

    pub fn set_at<T: Serialize>(
        &self,
        subject: &str,
        payload: &T,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let mut file = self.load();
        file.entries.insert(
            subject.to_string(),
            ContextEntry {
                payload,
                fetched_at,
            },
        );
        self.store(&file)
    }

    pub fn invalidate(&self, subject: &str) -> Result<(), StorageError> {
        let mut file = self.load();
        if file.entries.remove(subject).is_some() {
            self.store(&file)?;
        }
        Ok(())
    }

    /// Counts one inbound unit of work and persists it immediately.
    pub fn increment_message_count(&self) -> Result<u64, StorageError> {
        let mut file = self.load();
        file.message_count = file.message_count.saturating_add(1);
        self.store(&file)?;
        Ok(file.message_count)
    }

    pub fn message_count(&self) -> u64 {
        self.load().message_count
    }

    /// True once `message_threshold` messages arrived since the last refresh,
    /// whatever the TTL says.
    pub fn should_force_refresh(&self) -> bool {
        self.load().messages_since_refresh() >= self.policy.message_threshold
    }

    /// Moves the baseline up to the current counter without resetting it.
    pub fn mark_refreshed(&self) -> Result<(), StorageError> {
        let mut file = self.load();
        file.last_refresh_count = file.message_count;
        self.store(&file)
    }

    /// Session boundary: rewinds counter and baseline, keeps payloads.
    pub fn reset_session(&self) -> Result<(), StorageError> {
        let mut file = self.load();
        file.message_count = 0;
        file.last_refresh_count = 0;
        self.store(&file)
    }

    fn load(&self) -> ContextCacheFile {
        read_json_or_default(&self.path)
    }

    fn store(&self, file: &ContextCacheFile) -> Result<(), StorageError> {
        write_json_atomic(&self.path, file)
    }
}
