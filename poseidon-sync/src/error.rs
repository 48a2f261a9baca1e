//! Error types for poseidon-sync.

use std::path::PathBuf;

use thiserror::Error;

use poseidon_core::message::IncompleteRequest;

/// All errors that can arise while moving an action through the pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection was severed before the request could be registered.
    #[error("connection {connection} is severed")]
    ConnectionSevered { connection: u64 },

    /// An internal channel's receiving side is gone.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A translator-built request was missing a field its kind requires.
    #[error("malformed request: {0}")]
    Incomplete(#[from] IncompleteRequest),

    /// MIME resolution failed.
    #[error("mime error: {0}")]
    Mime(#[from] MimeError),
}

/// Failure reported by a [`crate::mime::MimeResolver`].
#[derive(Debug, Error)]
#[error("could not resolve MIME type for {path}: {reason}")]
pub struct MimeError {
    pub path: PathBuf,
    pub reason: String,
}
