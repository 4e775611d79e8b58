use memlink_config::env::ENV_LOG_LEVEL;
use memlink_config::{load_config, ResolvedConfig};
use memlink_core::HostId;
use memlink_storage::{CacheDir, LOG_FILE};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter};
use tracing_subscriber::EnvFilter;

/// Once `memlink.log` reaches this size it is moved to `memlink.log.1`,
/// replacing the previous backup.
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

pub struct LogGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Stdout belongs to the host, so log lines go to the log file when one is
/// open and to stderr otherwise.
struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(buf);
                }
            }
            None => {
                let _ = io::stderr().write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.flush();
                }
            }
            None => {
                let _ = io::stderr().flush();
            }
        }
        Ok(())
    }
}

pub fn init_logging(cache_dir: &CacheDir, file_logging: bool) -> Option<LogGuard> {
    let guard = if file_logging {
        match open_log_file(cache_dir) {
            Ok(file) => LogGuard {
                file: Some(Arc::new(Mutex::new(file))),
            },
            Err(err) => {
                eprintln!("log_file_error: {err}");
                LogGuard { file: None }
            }
        }
    } else {
        LogGuard { file: None }
    };

    let default_level = if guard.file.is_some() { "info" } else { "warn" };
    let level = std::env::var(ENV_LOG_LEVEL)
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| default_level.to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new(default_level));

    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || LogWriter { file: file.clone() });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

/// Config has to be read before the real subscriber exists, since it decides
/// where logs go. Anything it reports goes to stderr meanwhile.
pub fn load_config_logged(cache_dir: &CacheDir, host: HostId) -> Option<ResolvedConfig> {
    with_startup_logging(io::stderr, || load_config(cache_dir, host))
}

fn with_startup_logging<W, T>(make_writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

fn open_log_file(cache_dir: &CacheDir) -> io::Result<File> {
    fs::create_dir_all(cache_dir.root())?;
    let path = cache_dir.path(LOG_FILE);
    rotate_if_oversized(&path, MAX_LOG_BYTES)?;
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotate_if_oversized(path: &Path, max_bytes: u64) -> io::Result<()> {
    let Ok(metadata) = fs::metadata(path) else {
        return Ok(());
    };
    if metadata.len() < max_bytes {
        return Ok(());
    }
    let mut backup = path.as_os_str().to_owned();
    backup.push(".1");
    fs::rename(path, backup)
}
