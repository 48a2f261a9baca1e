//! Shared pipeline state: the current connection and the change queue.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::connection::{Connection, ConnectionId};
use crate::mime::MimeResolver;
use crate::queue::ChangeQueue;
use crate::translator::EventTranslator;

/// Owned replacement for process-wide socket/queue globals.
///
/// Cheap to clone; every clone refers to the same connection slot and queue.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    connection: Arc<watch::Sender<Option<Arc<Connection>>>>,
    queue: ChangeQueue,
}

impl PipelineContext {
    /// Build the context and spawn the queue worker.
    pub fn start<M: MimeResolver>(
        translator: EventTranslator<M>,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (connection, connections) = watch::channel(None);
        let (queue, worker) = ChangeQueue::spawn(translator, connections, shutdown);
        (
            Self {
                connection: Arc::new(connection),
                queue,
            },
            worker,
        )
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    pub fn current(&self) -> Option<Arc<Connection>> {
        self.connection.borrow().clone()
    }

    /// Make `connection` the sole current connection.
    ///
    /// Any previous connection is severed and returned.
    pub fn bind(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let previous = self.connection.send_replace(Some(connection));
        if let Some(previous) = &previous {
            let abandoned = previous.sever();
            tracing::debug!(
                connection = previous.id(),
                abandoned,
                "previous connection replaced",
            );
        }
        previous
    }

    /// Sever the connection with `id` and clear the slot if it is still current.
    ///
    /// Returns `true` when the slot was cleared.
    pub fn release(&self, id: ConnectionId) -> bool {
        self.connection.send_if_modified(|current| {
            match current.as_ref() {
                Some(connection) if connection.id() == id => {
                    connection.sever();
                    *current = None;
                    true
                }
                _ => false,
            }
        })
    }
}
