//! The single logical client connection and its pending-request table.
//!
//! A [`Connection`] never outlives its socket: when the transport drops it is
//! severed, which cancels its token and drops every registered waiter. A
//! reconnect creates a brand new `Connection` rather than reviving the old one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use poseidon_core::{CorrelationId, OutboundMessage, PendingRequest};

use crate::error::SyncError;

pub type ConnectionId = u64;

type PendingTable = HashMap<CorrelationId, oneshot::Sender<()>>;

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    pending: Mutex<PendingTable>,
    severed: CancellationToken,
}

/// How a registered request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    /// The connection was severed first; the request will never be answered.
    Abandoned,
}

/// Waiter for one request's acknowledgment, bounded by the connection's life.
#[derive(Debug)]
pub struct AckWait {
    id: CorrelationId,
    rx: oneshot::Receiver<()>,
    severed: CancellationToken,
}

impl AckWait {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Resolve on the matching `file:<id>` acknowledgment or on disconnect,
    /// whichever comes first.
    pub async fn wait(self) -> AckOutcome {
        let AckWait { rx, severed, .. } = self;
        tokio::select! {
            biased;
            acked = rx => match acked {
                Ok(()) => AckOutcome::Acknowledged,
                // Sender dropped: the table was cleared by `sever`.
                Err(_) => AckOutcome::Abandoned,
            },
            _ = severed.cancelled() => AckOutcome::Abandoned,
        }
    }
}

impl Connection {
    /// Create a connection plus the receiver the transport drains into its socket.
    pub fn new(id: ConnectionId) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id,
            outbound,
            pending: Mutex::new(HashMap::new()),
            severed: CancellationToken::new(),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send a message that expects no acknowledgment.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SyncError> {
        if self.is_severed() {
            return Err(SyncError::ConnectionSevered { connection: self.id });
        }
        self.outbound
            .send(message)
            .map_err(|_| SyncError::ChannelClosed("connection outbound"))
    }

    /// Register a waiter for `request.id`, then send the request.
    ///
    /// The waiter is registered first so an acknowledgment racing the send
    /// cannot be lost.
    pub fn request(&self, request: &PendingRequest) -> Result<AckWait, SyncError> {
        let message = OutboundMessage::try_from(request)?;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.lock_pending();
            if self.severed.is_cancelled() {
                return Err(SyncError::ConnectionSevered { connection: self.id });
            }
            pending.insert(request.id.clone(), tx);
        }

        if let Err(err) = self.send(message) {
            self.lock_pending().remove(&request.id);
            return Err(err);
        }

        Ok(AckWait {
            id: request.id.clone(),
            rx,
            severed: self.severed.clone(),
        })
    }

    /// Retire the request with `id`. Returns `false` for unknown or already
    /// retired ids.
    pub fn acknowledge(&self, id: &CorrelationId) -> bool {
        match self.lock_pending().remove(id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Mark the connection dead and abandon every outstanding request.
    ///
    /// Returns the number of requests abandoned. Idempotent.
    pub fn sever(&self) -> usize {
        let mut pending = self.lock_pending();
        self.severed.cancel();
        let abandoned = pending.len();
        pending.clear();
        abandoned
    }

    pub fn is_severed(&self) -> bool {
        self.severed.is_cancelled()
    }

    /// Completes once [`Connection::sever`] has been called.
    pub async fn severed(&self) {
        self.severed.cancelled().await;
    }

    /// Requests sent and not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use poseidon_core::{RequestKind, SemanticType};

    use super::*;

    fn remove_request(id: &str) -> PendingRequest {
        PendingRequest {
            id: CorrelationId::from(id),
            kind: RequestKind::Remove,
            directory: "src".to_string(),
            filename: "a.js".to_string(),
            file_type: Some(SemanticType::Script),
            mime_type: None,
            contents: None,
        }
    }

    #[tokio::test]
    async fn matching_ack_resolves_wait() {
        let (conn, mut rx) = Connection::new(1);
        let wait = conn.request(&remove_request("r1")).expect("request");

        let sent = rx.recv().await.expect("outbound message");
        assert_eq!(sent.event_name(), "file:removed");
        assert_eq!(conn.outstanding(), 1);

        assert!(conn.acknowledge(&CorrelationId::from("r1")));
        assert_eq!(wait.wait().await, AckOutcome::Acknowledged);
        assert_eq!(conn.outstanding(), 0);
    }

    #[tokio::test]
    async fn other_ids_do_not_resolve_wait() {
        let (conn, _rx) = Connection::new(1);
        let wait = conn.request(&remove_request("r1")).expect("request");

        assert!(!conn.acknowledge(&CorrelationId::from("r2")));
        assert!(!conn.acknowledge(&CorrelationId::from("file:r1")));

        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), wait.wait()).await;
        assert!(pending.is_err(), "wait must still be pending");
    }

    #[tokio::test]
    async fn sever_abandons_outstanding_requests() {
        let (conn, _rx) = Connection::new(1);
        let first = conn.request(&remove_request("r1")).expect("request");
        let second = conn.request(&remove_request("r2")).expect("request");

        assert_eq!(conn.sever(), 2);
        assert_eq!(first.wait().await, AckOutcome::Abandoned);
        assert_eq!(second.wait().await, AckOutcome::Abandoned);
        assert_eq!(conn.sever(), 0, "second sever is a no-op");
    }

    #[tokio::test]
    async fn request_after_sever_is_rejected() {
        let (conn, _rx) = Connection::new(3);
        conn.sever();
        let err = conn.request(&remove_request("r1")).unwrap_err();
        assert!(matches!(err, SyncError::ConnectionSevered { connection: 3 }));
        assert_eq!(conn.outstanding(), 0);
    }

    #[tokio::test]
    async fn dropped_transport_unregisters_request() {
        let (conn, rx) = Connection::new(1);
        drop(rx);
        let err = conn.request(&remove_request("r1")).unwrap_err();
        assert!(matches!(err, SyncError::ChannelClosed(_)));
        assert_eq!(conn.outstanding(), 0);
    }
}
