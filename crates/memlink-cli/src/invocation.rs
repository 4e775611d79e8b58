use anyhow::{Context, Result};
use memlink_config::detect_host;
use memlink_config::env::ProcessEnv;
use memlink_core::{new_instance_id, HostId};
use memlink_storage::CacheDir;

/// Everything about the current process that handlers would otherwise read
/// from globals.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub cache_dir: CacheDir,
    pub cwd: String,
    pub host: HostId,
    pub instance_id: String,
}

impl InvocationContext {
    pub fn new(cache_dir: CacheDir, cwd: impl Into<String>, host: HostId) -> Self {
        Self {
            cache_dir,
            cwd: cwd.into(),
            host,
            instance_id: new_instance_id(),
        }
    }

    pub fn from_process(host: Option<HostId>) -> Result<Self> {
        let cache_dir = CacheDir::resolve().context("resolve cache directory")?;
        let cwd = std::env::current_dir().context("read working directory")?;
        let host = host.unwrap_or_else(|| detect_host(&ProcessEnv));
        Ok(Self::new(cache_dir, cwd.to_string_lossy(), host))
    }

    /// The host reports the project directory in its payload; it wins over
    /// the directory the binary happened to be started in.
    pub fn with_cwd(mut self, cwd: Option<&str>) -> Self {
        if let Some(cwd) = cwd.map(str::trim).filter(|cwd| !cwd.is_empty()) {
            self.cwd = cwd.to_string();
        }
        self
    }
}
