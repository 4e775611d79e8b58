//! Free-form work history (`work-log.md`), one entry per line.
//!
//! Unlike the caches this file is durable history: `clear_all` never touches
//! it. Only the newest `max_entries` lines are kept.

use crate::{write_atomic, CacheDir, StorageError, WORK_LOG_FILE};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

pub const DEFAULT_WORK_LOG_MAX_ENTRIES: usize = 100;

pub struct WorkLog {
    path: PathBuf,
    max_entries: usize,
}

impl WorkLog {
    pub fn new(cache_dir: &CacheDir, max_entries: usize) -> Self {
        Self {
            path: cache_dir.path(WORK_LOG_FILE),
            max_entries: max_entries.max(1),
        }
    }

    pub fn append(&self, text: &str) -> Result<(), StorageError> {
        self.append_at(text, Utc::now())
    }

    pub fn append_at(&self, text: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flattened.is_empty() {
            return Ok(());
        }
        let line = format!(
            "- [{}] {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            flattened
        );

        let mut entries = self.read_entries()?;
        if entries.len() < self.max_entries {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|err| StorageError::io(&self.path, err))?;
            return writeln!(file, "{line}").map_err(|err| StorageError::io(&self.path, err));
        }

        entries.push(line);
        let start = entries.len() - self.max_entries;
        let mut payload = entries[start..].join("\n");
        payload.push('\n');
        write_atomic(&self.path, payload.as_bytes())
    }

    /// Newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<String>, StorageError> {
        let entries = self.read_entries()?;
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }

    fn read_entries(&self) -> Result<Vec<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(StorageError::io(&self.path, err)),
        }
    }
}
