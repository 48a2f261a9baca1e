//! Poseidon daemon runtime: filesystem watcher + change queue + WebSocket server.

mod error;
pub mod manager;
pub mod protocol;
mod runtime;
pub mod watcher;

pub use error::DaemonError;
pub use manager::ConnectionManager;
pub use protocol::{decode_frame, encode_frame, handle_inbound, Inbound};
pub use runtime::{router, run, start_blocking, AppState};
pub use watcher::{start_watcher, WatcherHandle};
