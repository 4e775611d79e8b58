//! Draining the durable queue into the remote session.
//!
//! Records for a directory leave the queue only after every batch for that
//! directory was accepted. A failure part-way leaves them all queued, so the
//! next flush may resend batches the service already stored.

use crate::api::{MemoryApi, OutboundMessage};
use crate::identity::Identities;
use crate::SyncError;
use chrono::SecondsFormat;
use memlink_core::{split_text, QueuedMessage, DEFAULT_MAX_MESSAGE_BYTES};
use memlink_storage::MessageQueue;
use serde_json::{Map, Value};
use tracing::info;

pub const MAX_MESSAGES_PER_REQUEST: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub records: usize,
    pub messages: usize,
    pub batches: usize,
}

pub struct Uploader<'a, A: ?Sized> {
    api: &'a A,
    queue: &'a MessageQueue,
    max_message_bytes: usize,
}

impl<'a, A: MemoryApi + ?Sized> Uploader<'a, A> {
    pub fn new(api: &'a A, queue: &'a MessageQueue) -> Self {
        Self {
            api,
            queue,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    pub async fn flush(&self, ids: &Identities, cwd: &str) -> Result<FlushReport, SyncError> {
        let pending = self.queue.list_pending(Some(cwd))?;
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }

        let messages: Vec<OutboundMessage> = pending
            .iter()
            .flat_map(|record| outbound_messages(record, ids, self.max_message_bytes))
            .collect();

        let mut batches = 0;
        for batch in messages.chunks(MAX_MESSAGES_PER_REQUEST) {
            self.api
                .add_messages(&ids.workspace_id, &ids.session_id, batch)
                .await?;
            batches += 1;
        }
        self.queue.mark_uploaded(Some(cwd))?;

        let report = FlushReport {
            records: pending.len(),
            messages: messages.len(),
            batches,
        };
        info!(
            "queue_flushed: cwd={cwd} records={} messages={} batches={}",
            report.records, report.messages, report.batches
        );
        Ok(report)
    }
}

/// One record becomes one message, or several `[Part i/N]` messages when its
/// content exceeds `max_bytes`.
pub fn outbound_messages(
    record: &QueuedMessage,
    ids: &Identities,
    max_bytes: usize,
) -> Vec<OutboundMessage> {
    let peer_id = ids.peer_id_for(&record.peer_id);
    let parts = split_text(&record.content, max_bytes);
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(index, content)| {
            let mut metadata = Map::new();
            metadata.insert("cwd".to_string(), Value::String(record.cwd.clone()));
            metadata.insert(
                "queued_at".to_string(),
                Value::String(record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
            if let Some(instance_id) = &record.instance_id {
                metadata.insert(
                    "instance_id".to_string(),
                    Value::String(instance_id.clone()),
                );
            }
            if total > 1 {
                metadata.insert("part".to_string(), Value::from(index + 1));
                metadata.insert("parts".to_string(), Value::from(total));
            }
            OutboundMessage {
                peer_id: peer_id.clone(),
                content,
                metadata,
            }
        })
        .collect()
}
