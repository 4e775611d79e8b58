//! Append-only durable log of outbound messages (`message-queue.jsonl`).
//!
//! A record is written and flushed before the caller attempts any network
//! call. Records leave the log only once their upload is confirmed, and a
//! scoped removal only ever touches one working directory.

use crate::{write_atomic, CacheDir, StorageError, MESSAGE_QUEUE_FILE};
use chrono::Utc;
use memlink_core::QueuedMessage;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct MessageQueue {
    path: PathBuf,
}

impl MessageQueue {
    pub fn new(cache_dir: &CacheDir) -> Self {
        Self {
            path: cache_dir.path(MESSAGE_QUEUE_FILE),
        }
    }

    pub fn enqueue(
        &self,
        content: &str,
        peer_id: &str,
        cwd: &str,
        instance_id: Option<&str>,
    ) -> Result<QueuedMessage, StorageError> {
        let message = QueuedMessage {
            content: content.to_string(),
            peer_id: peer_id.to_string(),
            cwd: cwd.to_string(),
            timestamp: Utc::now(),
            uploaded: false,
            instance_id: instance_id.map(str::to_string),
        };
        let mut line = serde_json::to_string(&message)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| StorageError::io(&self.path, err))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|err| StorageError::io(&self.path, err))?;
        Ok(message)
    }

    /// Records not yet uploaded, optionally limited to one working directory.
    pub fn list_pending(&self, cwd: Option<&str>) -> Result<Vec<QueuedMessage>, StorageError> {
        let pending = self
            .read_lines()?
            .iter()
            .filter_map(|line| parse_line(line))
            .filter(|message| !message.uploaded)
            .filter(|message| cwd.map_or(true, |cwd| message.cwd == cwd))
            .collect();
        Ok(pending)
    }

    /// Without a directory the whole log is truncated. With one, the log is
    /// rewritten keeping every line that belongs elsewhere.
    pub fn mark_uploaded(&self, cwd: Option<&str>) -> Result<(), StorageError> {
        let Some(cwd) = cwd else {
            return match fs::write(&self.path, "") {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(StorageError::io(&self.path, err)),
            };
        };

        let lines = self.read_lines()?;
        if lines.is_empty() {
            return Ok(());
        }
        let mut kept = String::new();
        let mut removed = 0_usize;
        for line in &lines {
            // Unparsable lines are kept: they may be another writer's backlog.
            let belongs_here = parse_line(line).map_or(false, |message| message.cwd == cwd);
            if belongs_here {
                removed += 1;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }
        if removed == 0 {
            return Ok(());
        }
        write_atomic(&self.path, kept.as_bytes())?;
        debug!("queue_marked_uploaded: cwd={cwd} removed={removed}");
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>, StorageError> {
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

fn parse_line(line: &str) -> Option<QueuedMessage> {
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!("queue_line_corrupt: {err}");
            None
        }
    }
}
