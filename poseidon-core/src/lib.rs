//! Poseidon core library — domain types, path classification, wire messages,
//! configuration, errors.
//!
//! - [`types`] — events, requests, correlation ids
//! - [`classify`] — extension allow-list and path splitting
//! - [`message`] — JSON frames exchanged with the client
//! - [`config`] — [`DaemonConfig`] loading
//! - [`error`] — [`ConfigError`]

pub mod classify;
pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use classify::{classify, split_path, Classification};
pub use config::{DaemonConfig, MimeFailurePolicy, TlsConfig, WatchConfig};
pub use error::ConfigError;
pub use message::{InboundMessage, OutboundMessage};
pub use types::{
    ChangeKind, CorrelationId, CorrelationIds, PendingRequest, QueuedAction, RawEvent,
    RequestKind, SemanticType,
};
