//! Host-segmented configuration (`config.json`) with environment overrides.
//!
//! Per-host fields (workspace, AI peer) resolve as env var > `hosts.<id>` block
//! > legacy flat field > built-in default for the host. Shared fields
//! (credential, user identity, session overrides) are host-independent and
//! always prefer the environment. Saving is read-merge-write so one host never
//! clobbers another host's block.

pub mod env;

use env::{
    EnvSource, ProcessEnv, ENV_AI_PEER, ENV_API_KEY, ENV_ENABLED, ENV_ENDPOINT, ENV_HOST,
    ENV_LOGGING, ENV_PEER_NAME, ENV_SAVE_MESSAGES, ENV_WORKSPACE,
};
use memlink_core::{sanitize_name, HostId, RefreshPolicy};
use memlink_storage::{
    read_json_or_default, write_json_atomic, CacheDir, StorageError, CONFIG_FILE,
    DEFAULT_WORK_LOG_MAX_ENTRIES,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const PRODUCTION_URL: &str = "https://api.memlink.dev";
pub const LOCAL_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid endpoint {value:?}: {reason}")]
    InvalidEndpoint { value: String, reason: String },
}

/// Which deployment of the remote API to talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EndpointSelection {
    #[default]
    Production,
    Local,
    Custom(Url),
}

impl EndpointSelection {
    pub fn base_url(&self) -> Url {
        match self {
            EndpointSelection::Production => {
                Url::parse(PRODUCTION_URL).expect("production url is valid")
            }
            EndpointSelection::Local => Url::parse(LOCAL_URL).expect("local url is valid"),
            EndpointSelection::Custom(url) => url.clone(),
        }
    }
}

impl fmt::Display for EndpointSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSelection::Production => f.write_str("production"),
            EndpointSelection::Local => f.write_str("local"),
            EndpointSelection::Custom(url) => f.write_str(url.as_str()),
        }
    }
}

impl FromStr for EndpointSelection {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        match trimmed.to_lowercase().as_str() {
            "production" | "prod" => Ok(EndpointSelection::Production),
            "local" | "localhost" => Ok(EndpointSelection::Local),
            _ => Url::parse(trimmed)
                .map(EndpointSelection::Custom)
                .map_err(|err| ConfigError::InvalidEndpoint {
                    value: trimmed.to_string(),
                    reason: err.to_string(),
                }),
        }
    }
}

/// Per-host identity overrides stored under `hosts.<id>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostConfigBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_peer: Option<String>,
}

/// On-disk shape of `config.json`. Keys this version does not know are kept
/// in `extra` and written back untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    peer_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sessions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    save_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_refresh: Option<RefreshPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    work_log_max_entries: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    hosts: BTreeMap<String, HostConfigBlock>,
    // Pre-host-segmentation layout; removed on the next save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ai_peer: Option<String>,
    #[serde(default, flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub credential: String,
    pub user_peer_name: String,
    pub workspace_name: String,
    pub ai_peer_name: String,
    /// Working directory to explicit session name.
    pub session_overrides: BTreeMap<String, String>,
    pub save_messages: bool,
    pub enabled: bool,
    pub logging: bool,
    pub refresh: RefreshPolicy,
    pub endpoint: EndpointSelection,
    pub host: HostId,
    pub work_log_max_entries: usize,
}

impl ResolvedConfig {
    /// A config carrying only a credential, every other field at its default.
    pub fn with_defaults(
        credential: impl Into<String>,
        host: HostId,
        user_peer_name: impl Into<String>,
    ) -> Self {
        Self {
            credential: credential.into(),
            user_peer_name: user_peer_name.into(),
            workspace_name: host.default_workspace().to_string(),
            ai_peer_name: host.default_ai_peer().to_string(),
            session_overrides: BTreeMap::new(),
            save_messages: true,
            enabled: true,
            logging: true,
            refresh: RefreshPolicy::default(),
            endpoint: EndpointSelection::default(),
            host,
            work_log_max_entries: DEFAULT_WORK_LOG_MAX_ENTRIES,
        }
    }

    pub fn masked_credential(&self) -> String {
        let chars: Vec<char> = self.credential.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

/// Host from `MEMLINK_HOST`, then host-specific environment markers.
pub fn detect_host(env: &impl EnvSource) -> HostId {
    if let Some(value) = env.non_empty(ENV_HOST) {
        match value.parse::<HostId>() {
            Ok(host) => return host,
            Err(err) => warn!("host_env_invalid: {err}"),
        }
    }
    if env.non_empty("CURSOR_TRACE_ID").is_some() {
        return HostId::Cursor;
    }
    if env.non_empty("CODEX_HOME").is_some() {
        return HostId::Codex;
    }
    HostId::ClaudeCode
}

/// Loads the config for `host` using the process environment.
pub fn load_config(cache_dir: &CacheDir, host: HostId) -> Option<ResolvedConfig> {
    load_config_with_env(cache_dir, host, &ProcessEnv)
}

/// Returns `None` only when no credential is found in either the environment
/// or the file; that is the single "not configured" state callers check.
pub fn load_config_with_env(
    cache_dir: &CacheDir,
    host: HostId,
    env: &impl EnvSource,
) -> Option<ResolvedConfig> {
    let file = read_config_file(cache_dir);

    let credential = env
        .non_empty(ENV_API_KEY)
        .or_else(|| non_blank(file.api_key.as_deref()))?;

    let user_peer_name = env
        .non_empty(ENV_PEER_NAME)
        .or_else(|| non_blank(file.peer_name.as_deref()))
        .or_else(|| env.non_empty("USER"))
        .unwrap_or_else(|| "user".to_string());

    let block = file.hosts.get(host.as_str());
    let workspace_name = env
        .non_empty(ENV_WORKSPACE)
        .or_else(|| non_blank(block.and_then(|block| block.workspace.as_deref())))
        .or_else(|| non_blank(file.workspace.as_deref()))
        .unwrap_or_else(|| host.default_workspace().to_string());
    let ai_peer_name = env
        .non_empty(ENV_AI_PEER)
        .or_else(|| non_blank(block.and_then(|block| block.ai_peer.as_deref())))
        .or_else(|| non_blank(file.ai_peer.as_deref()))
        .unwrap_or_else(|| host.default_ai_peer().to_string());

    let endpoint = env
        .non_empty(ENV_ENDPOINT)
        .or_else(|| non_blank(file.endpoint.as_deref()))
        .map(|value| {
            value.parse::<EndpointSelection>().unwrap_or_else(|err| {
                warn!("endpoint_invalid: {err}; using production");
                EndpointSelection::Production
            })
        })
        .unwrap_or_default();

    Some(ResolvedConfig {
        credential,
        user_peer_name,
        workspace_name,
        ai_peer_name,
        session_overrides: file.sessions,
        save_messages: env
            .flag(ENV_SAVE_MESSAGES)
            .or(file.save_messages)
            .unwrap_or(true),
        enabled: env.flag(ENV_ENABLED).or(file.enabled).unwrap_or(true),
        logging: env.flag(ENV_LOGGING).or(file.logging).unwrap_or(true),
        refresh: file.context_refresh.unwrap_or_default(),
        endpoint,
        host,
        work_log_max_entries: file
            .work_log_max_entries
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_WORK_LOG_MAX_ENTRIES),
    })
}

/// Read-merge-write. Shared fields are overwritten, only `config.host`'s block
/// is written, and legacy flat fields are dropped once any host block exists.
pub fn save_config(cache_dir: &CacheDir, config: &ResolvedConfig) -> Result<(), ConfigError> {
    let mut file = read_config_file(cache_dir);

    file.api_key = Some(config.credential.clone());
    file.peer_name = Some(config.user_peer_name.clone());
    file.sessions = config.session_overrides.clone();
    file.save_messages = Some(config.save_messages);
    file.enabled = Some(config.enabled);
    file.logging = Some(config.logging);
    file.context_refresh = Some(config.refresh);
    file.endpoint = Some(config.endpoint.to_string());
    file.work_log_max_entries = Some(config.work_log_max_entries);

    file.hosts.insert(
        config.host.as_str().to_string(),
        HostConfigBlock {
            workspace: Some(config.workspace_name.clone()),
            ai_peer: Some(config.ai_peer_name.clone()),
        },
    );
    if !file.hosts.is_empty() {
        file.workspace = None;
        file.ai_peer = None;
    }

    cache_dir.ensure()?;
    write_json_atomic(&cache_dir.path(CONFIG_FILE), &file)?;
    Ok(())
}

/// Deterministic session name: an explicit per-directory override, otherwise
/// `{user}-{last path segment}`, both sanitized.
pub fn session_name(config: &ResolvedConfig, cwd: &str) -> String {
    if let Some(name) = non_blank(config.session_overrides.get(cwd).map(String::as_str)) {
        return name;
    }
    let segment = Path::new(cwd)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "root".to_string());
    format!(
        "{}-{}",
        sanitize_name(&config.user_peer_name),
        sanitize_name(&segment)
    )
}

pub fn config_exists(cache_dir: &CacheDir) -> bool {
    fs::metadata(cache_dir.path(CONFIG_FILE)).is_ok()
}

fn read_config_file(cache_dir: &CacheDir) -> ConfigFile {
    read_json_or_default(&cache_dir.path(CONFIG_FILE))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
