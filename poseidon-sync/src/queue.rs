//! The change queue: a strictly serial FIFO of raw filesystem events.
//!
//! [`ChangeQueue::enqueue`] never blocks and may be called from any thread,
//! including the watcher's callback thread. A single worker task drains the
//! channel and runs the translator on one action at a time; the next action
//! is not popped until the previous translation has been acknowledged,
//! skipped, or abandoned.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use poseidon_core::{QueuedAction, RawEvent};

use crate::connection::Connection;
use crate::error::SyncError;
use crate::mime::MimeResolver;
use crate::translator::{EventTranslator, Translation};

/// Report emitted for every completed action. `outcome` is never
/// [`Translation::Retry`]; retried actions report once, when they finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub sequence: u64,
    pub event: RawEvent,
    pub outcome: Translation,
}

/// Cloneable producer handle for the change queue.
#[derive(Debug, Clone)]
pub struct ChangeQueue {
    tx: mpsc::UnboundedSender<QueuedAction>,
    next_sequence: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
    reports: broadcast::Sender<Processed>,
}

impl ChangeQueue {
    /// Spawn the drain worker and return the producer handle.
    ///
    /// The worker translates against whichever connection is current in
    /// `connections` when an action is dequeued, waiting if there is none.
    /// It exits on `shutdown` or once every producer handle is dropped.
    pub fn spawn<M: MimeResolver>(
        translator: EventTranslator<M>,
        connections: watch::Receiver<Option<Arc<Connection>>>,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(256);
        let queue = Self {
            tx,
            next_sequence: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(AtomicUsize::new(0)),
            reports,
        };

        let worker = Worker {
            rx,
            translator,
            connections,
            shutdown,
            pending: queue.pending.clone(),
            reports: queue.reports.clone(),
        };
        let handle = tokio::spawn(worker.drain());
        (queue, handle)
    }

    /// Append an event. Never blocks.
    pub fn enqueue(&self, event: RawEvent) -> Result<u64, SyncError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueuedAction { sequence, event }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::ChannelClosed("change queue"));
        }
        tracing::trace!(sequence, "action enqueued");
        Ok(sequence)
    }

    /// Actions enqueued and not yet completed, including the one in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Processed> {
        self.reports.subscribe()
    }
}

struct Worker<M> {
    rx: mpsc::UnboundedReceiver<QueuedAction>,
    translator: EventTranslator<M>,
    connections: watch::Receiver<Option<Arc<Connection>>>,
    shutdown: broadcast::Receiver<()>,
    pending: Arc<AtomicUsize>,
    reports: broadcast::Sender<Processed>,
}

impl<M: MimeResolver> Worker<M> {
    async fn drain(mut self) {
        loop {
            let action = tokio::select! {
                _ = self.shutdown.recv() => break,
                action = self.rx.recv() => match action {
                    Some(action) => action,
                    None => break,
                },
            };

            let Some(outcome) = self.deliver(&action).await else {
                break;
            };

            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(
                sequence = action.sequence,
                kind = %action.event.kind,
                outcome = ?outcome,
                "action completed",
            );
            let _ = self.reports.send(Processed {
                sequence: action.sequence,
                event: action.event,
                outcome,
            });
        }
        tracing::debug!("change queue worker stopped");
    }

    /// Translate `action` against the current connection, starting over on
    /// the next connection whenever the current one drops before the request
    /// is sent. `None` on shutdown.
    async fn deliver(&mut self, action: &QueuedAction) -> Option<Translation> {
        loop {
            let connection = tokio::select! {
                _ = self.shutdown.recv() => return None,
                connection = live_connection(&mut self.connections) => match connection {
                    Some(connection) => connection,
                    None => return None,
                },
            };

            let outcome = tokio::select! {
                _ = self.shutdown.recv() => return None,
                outcome = self.translator.translate(action, &connection) => outcome,
            };

            if outcome != Translation::Retry {
                return Some(outcome);
            }
            tracing::debug!(
                sequence = action.sequence,
                connection = connection.id(),
                "connection replaced before send, retrying action",
            );
        }
    }
}

/// Wait until a non-severed connection is current. `None` once the sender
/// side of the watch channel is gone.
async fn live_connection(
    connections: &mut watch::Receiver<Option<Arc<Connection>>>,
) -> Option<Arc<Connection>> {
    let current = connections
        .wait_for(|current| current.as_ref().is_some_and(|c| !c.is_severed()))
        .await
        .ok()?;
    (*current).clone()
}
