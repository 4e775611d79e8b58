pub mod context_cache;
pub mod git_state;
pub mod identity;
pub mod queue;
pub mod work_log;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub use context_cache::ContextCache;
pub use git_state::GitStateStore;
pub use identity::IdentityCache;
pub use queue::MessageQueue;
pub use work_log::{WorkLog, DEFAULT_WORK_LOG_MAX_ENTRIES};

pub const CONFIG_FILE: &str = "config.json";
pub const IDENTITY_CACHE_FILE: &str = "cache.json";
pub const CONTEXT_CACHE_FILE: &str = "context-cache.json";
pub const MESSAGE_QUEUE_FILE: &str = "message-queue.jsonl";
pub const GIT_STATE_FILE: &str = "git-state.json";
pub const WORK_LOG_FILE: &str = "work-log.md";
pub const LOG_FILE: &str = "memlink.log";

/// Files removed by [`CacheDir::clear_all`]. The work log and config are durable
/// history, not cache, and are never listed here.
const CLEARABLE_FILES: [&str; 4] = [
    IDENTITY_CACHE_FILE,
    CONTEXT_CACHE_FILE,
    MESSAGE_QUEUE_FILE,
    GIT_STATE_FILE,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("home directory could not be resolved")]
    NoHome,
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Root directory holding every memlink file for the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `MEMLINK_HOME` when set, otherwise `~/.memlink`.
    pub fn resolve() -> Result<Self, StorageError> {
        if let Ok(value) = env::var("MEMLINK_HOME") {
            if !value.trim().is_empty() {
                return Ok(Self::new(value));
            }
        }
        let home = dirs::home_dir().ok_or(StorageError::NoHome)?;
        Ok(Self::new(home.join(".memlink")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn ensure(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|err| StorageError::io(&self.root, err))
    }

    /// Deletes every cache file and returns the ones that existed.
    pub fn clear_all(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut removed = Vec::new();
        for file in CLEARABLE_FILES {
            let path = self.path(file);
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::io(&path, err)),
            }
        }
        debug!("cache_cleared: {} files", removed.len());
        Ok(removed)
    }
}

/// Reads a JSON file, treating a missing or unparsable file as the default value.
pub fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("cache_read_failed: {}: {err}", path.display());
            }
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            warn!("cache_corrupt: {}: {err}", path.display());
            T::default()
        }
    }
}

/// Serializes `value` to a sibling temp file and renames it over `path`.
pub fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    write_atomic(path, payload.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, bytes).map_err(|err| StorageError::io(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| StorageError::io(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        values: BTreeMap<String, u32>,
    }

    #[test]
    fn corrupt_json_reads_as_default() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").expect("write");

        let sample: Sample = read_json_or_default(&path);
        assert_eq!(sample, Sample::default());

        let missing: Sample = read_json_or_default(&dir.path().join("missing.json"));
        assert_eq!(missing, Sample::default());
    }

    #[test]
    fn atomic_write_creates_parent_and_leaves_no_temp_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested/state.json");
        let mut sample = Sample::default();
        sample.values.insert("a".to_string(), 1);

        write_json_atomic(&path, &sample).expect("write");

        let loaded: Sample = read_json_or_default(&path);
        assert_eq!(loaded, sample);
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[test]
    fn clear_all_keeps_work_log_and_config() {
        let dir = TempDir::new().expect("temp dir");
        let cache = CacheDir::new(dir.path());
        cache.ensure().expect("ensure");
        for file in [
            CONFIG_FILE,
            IDENTITY_CACHE_FILE,
            CONTEXT_CACHE_FILE,
            MESSAGE_QUEUE_FILE,
            GIT_STATE_FILE,
            WORK_LOG_FILE,
        ] {
            fs::write(cache.path(file), "{}").expect("seed");
        }

        let removed = cache.clear_all().expect("clear");
        assert_eq!(removed.len(), 4);
        assert!(cache.path(WORK_LOG_FILE).exists());
        assert!(cache.path(CONFIG_FILE).exists());
        assert!(!cache.path(MESSAGE_QUEUE_FILE).exists());

        let again = cache.clear_all().expect("clear twice");
        assert!(again.is_empty());
    }
}
