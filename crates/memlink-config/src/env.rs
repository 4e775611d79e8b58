use std::collections::BTreeMap;

pub const ENV_API_KEY: &str = "MEMLINK_API_KEY";
pub const ENV_PEER_NAME: &str = "MEMLINK_PEER_NAME";
pub const ENV_WORKSPACE: &str = "MEMLINK_WORKSPACE";
pub const ENV_AI_PEER: &str = "MEMLINK_AI_PEER";
pub const ENV_ENDPOINT: &str = "MEMLINK_ENDPOINT";
pub const ENV_ENABLED: &str = "MEMLINK_ENABLED";
pub const ENV_SAVE_MESSAGES: &str = "MEMLINK_SAVE_MESSAGES";
pub const ENV_LOGGING: &str = "MEMLINK_LOGGING";
pub const ENV_HOST: &str = "MEMLINK_HOST";
pub const ENV_LOG_LEVEL: &str = "MEMLINK_LOG_LEVEL";

/// Where environment overrides come from. The process environment in
/// production, a plain map in tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;

    /// Value of `key` when it is set to something other than whitespace.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.var(key).as_deref().and_then(parse_bool_env)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Hides every `MEMLINK_*` override while still exposing ambient variables
/// such as `USER`. Used when a resolved config is about to be written back.
#[derive(Debug, Clone, Copy)]
pub struct WithoutOverrides<'a, E: ?Sized>(pub &'a E);

impl<E: EnvSource + ?Sized> EnvSource for WithoutOverrides<'_, E> {
    fn var(&self, key: &str) -> Option<String> {
        if key.starts_with("MEMLINK_") {
            return None;
        }
        self.0.var(key)
    }
}

pub fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
