//! Talking to the remote memory API on behalf of one hook invocation.
//!
//! [`MemoryApi`] is the seam: [`HttpMemoryClient`] speaks HTTP in production,
//! tests substitute an in-memory implementation. Everything above the trait
//! (identity resolution, context assembly, queue upload) layers the local
//! caches in front of it.

pub mod api;
pub mod assemble;
pub mod http;
pub mod identity;
pub mod upload;

pub use api::{ContextRequest, MemoryApi, OutboundMessage};
pub use assemble::{ContextAssembler, DEFAULT_MAX_CONCLUSIONS};
pub use http::{HttpMemoryClient, DEFAULT_REQUEST_TIMEOUT};
pub use identity::{Identities, IdentityResolver};
pub use upload::{FlushReport, Uploader, MAX_MESSAGES_PER_REQUEST};

use memlink_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Failure of an operation that touches both the remote API and local files.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
