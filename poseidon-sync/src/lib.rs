//! # poseidon-sync
//!
//! The change-to-event pipeline.
//!
//! Raw filesystem events go into the [`ChangeQueue`]; its single worker hands
//! them one at a time to the [`EventTranslator`], which sends a request over
//! the current [`Connection`] and waits for the matching `file:<id>`
//! acknowledgment (or for the connection to drop) before the next action is
//! popped. [`PipelineContext`] ties the queue to the connection slot.

pub mod connection;
pub mod error;
pub mod mime;
pub mod pipeline;
pub mod queue;
pub mod translator;

pub use connection::{AckOutcome, AckWait, Connection, ConnectionId};
pub use error::{MimeError, SyncError};
pub use mime::{GuessMimeResolver, MimeResolver};
pub use pipeline::PipelineContext;
pub use queue::{ChangeQueue, Processed};
pub use translator::{EventTranslator, SkipReason, Translation};
