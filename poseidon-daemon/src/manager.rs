//! Connection lifecycle: bind, settings push, watcher restart, release.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use poseidon_core::message::ReloadOnChange;
use poseidon_core::{DaemonConfig, OutboundMessage, WatchConfig};
use poseidon_sync::{Connection, PipelineContext};

use crate::error::DaemonError;
use crate::watcher::{start_watcher, WatcherHandle};

/// Owns the single client slot and the watcher that feeds the queue.
pub struct ConnectionManager {
    pipeline: PipelineContext,
    root: PathBuf,
    watch: WatchConfig,
    settings: Option<ReloadOnChange>,
    watcher: Mutex<Option<WatcherHandle>>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(pipeline: PipelineContext, config: &DaemonConfig) -> Self {
        let settings = config.window_path.clone().map(|window_path| ReloadOnChange {
            window_path,
            state: config.reload_on_change,
        });
        Self {
            pipeline,
            root: config.root.clone(),
            watch: config.watch.clone(),
            settings,
            watcher: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_watching(&self) -> bool {
        self.lock_watcher().is_some()
    }

    /// Accept a new client. It becomes the sole current connection; any
    /// previous one is severed.
    pub async fn connect(
        self: &Arc<Self>,
    ) -> Result<(Arc<Connection>, mpsc::UnboundedReceiver<OutboundMessage>), DaemonError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, outbound) = Connection::new(id);

        // Queued before binding so it precedes any request from the worker.
        if let Some(settings) = &self.settings {
            connection.send(OutboundMessage::ReloadOnChange(settings.clone()))?;
        }
        self.pipeline.bind(connection.clone());
        tracing::info!(connection = id, "client connected with id: {id}");

        if let Err(err) = self.restart_watcher().await {
            self.pipeline.release(id);
            return Err(err);
        }
        tracing::info!(
            connection = id,
            root = %self.root.display(),
            "watching {} for changes",
            self.root.display(),
        );
        Ok((connection, outbound))
    }

    /// Release `connection`. Outstanding requests are abandoned; the watcher
    /// keeps running so changes queue for the next client.
    pub fn disconnect(&self, connection: &Connection) {
        let abandoned = connection.outstanding();
        let cleared = self.pipeline.release(connection.id());
        connection.sever();
        tracing::info!(
            connection = connection.id(),
            abandoned,
            current = cleared,
            "client disconnected with id: {}",
            connection.id(),
        );
    }

    /// Stop the watcher, if any.
    pub fn stop_watching(&self) {
        if self.lock_watcher().take().is_some() {
            tracing::debug!("watcher stopped");
        }
    }

    async fn restart_watcher(self: &Arc<Self>) -> Result<(), DaemonError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut slot = this.lock_watcher();
            // Drop the old backend first so it cannot race the new scan.
            slot.take();
            let handle = start_watcher(&this.root, &this.watch, this.pipeline.queue().clone())?;
            *slot = Some(handle);
            Ok(())
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("watcher start task failed: {err}")))?
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<WatcherHandle>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use poseidon_core::{MimeFailurePolicy, SemanticType};
    use poseidon_sync::{EventTranslator, GuessMimeResolver};
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn manager(
        root: &TempDir,
        window_path: Option<&str>,
    ) -> (Arc<ConnectionManager>, broadcast::Sender<()>) {
        let root = root.path().canonicalize().expect("canonical root");
        let (shutdown, rx) = broadcast::channel(1);
        let translator = EventTranslator::new(&root, GuessMimeResolver, MimeFailurePolicy::Skip);
        let (pipeline, _worker) = PipelineContext::start(translator, rx);
        let config = DaemonConfig {
            root,
            window_path: window_path.map(str::to_string),
            ..DaemonConfig::default()
        };
        (Arc::new(ConnectionManager::new(pipeline, &config)), shutdown)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> OutboundMessage {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("message within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn settings_precede_initial_uploads() {
        let root = TempDir::new().expect("root");
        fs::write(root.path().join("a.js"), "let a;").expect("write");
        let (manager, _shutdown) = manager(&root, Some("/editor/scene/1"));

        let (connection, mut rx) = manager.connect().await.expect("connect");
        match next(&mut rx).await {
            OutboundMessage::ReloadOnChange(settings) => {
                assert_eq!(settings.window_path, "/editor/scene/1");
                assert!(settings.state);
            }
            other => panic!("expected settings first, got {other:?}"),
        }
        match next(&mut rx).await {
            OutboundMessage::FileUpdated(update) => {
                assert_eq!(update.filename, "a.js");
                assert_eq!(update.file_type, SemanticType::Script);
                connection.acknowledge(&update.id);
            }
            other => panic!("expected file:updated, got {other:?}"),
        }
        assert!(manager.is_watching());
    }

    #[tokio::test]
    async fn no_settings_without_window_path() {
        let root = TempDir::new().expect("root");
        let (manager, _shutdown) = manager(&root, None);

        let (_connection, mut rx) = manager.connect().await.expect("connect");
        let message = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(!matches!(message, Ok(Some(_))), "unexpected {message:?}");
    }

    #[tokio::test]
    async fn second_client_replaces_first() {
        let root = TempDir::new().expect("root");
        let (manager, _shutdown) = manager(&root, None);

        let (first, _rx1) = manager.connect().await.expect("first");
        let (second, _rx2) = manager.connect().await.expect("second");
        assert_eq!((first.id(), second.id()), (1, 2));
        assert!(first.is_severed());

        // The stale client going away must not unbind the new one.
        manager.disconnect(&first);
        assert_eq!(manager.pipeline().current().map(|c| c.id()), Some(2));

        manager.disconnect(&second);
        assert!(second.is_severed());
        assert!(manager.pipeline().current().is_none());
        assert!(manager.is_watching(), "watching continues after disconnect");

        manager.stop_watching();
        assert!(!manager.is_watching());
    }
}
