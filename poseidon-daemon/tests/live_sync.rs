//! Live watcher → queue → client round trips, with the client simulated by
//! feeding acknowledgment frames through `handle_inbound`.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use poseidon_core::{DaemonConfig, MimeFailurePolicy, OutboundMessage, WatchConfig};
use poseidon_daemon::{encode_frame, handle_inbound, ConnectionManager, Inbound};
use poseidon_sync::{Connection, EventTranslator, GuessMimeResolver, PipelineContext};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

const WAIT: Duration = Duration::from_secs(5);

struct Daemon {
    root: TempDir,
    manager: Arc<ConnectionManager>,
    _shutdown: broadcast::Sender<()>,
}

impl Daemon {
    fn start(watch: WatchConfig) -> Self {
        let root = TempDir::new().expect("root");
        fs::write(root.path().join("a.js"), "console.log('a')").expect("seed");
        let config = DaemonConfig {
            root: root.path().canonicalize().expect("canonical root"),
            watch,
            ..DaemonConfig::default()
        };
        let (shutdown, rx) = broadcast::channel(1);
        let translator =
            EventTranslator::new(&config.root, GuessMimeResolver, MimeFailurePolicy::Skip);
        let (pipeline, _worker) = PipelineContext::start(translator, rx);
        Self {
            root,
            manager: Arc::new(ConnectionManager::new(pipeline, &config)),
            _shutdown: shutdown,
        }
    }
}

/// Receive frames, acknowledging each, until one for `filename` with
/// `contents` shows up.
async fn await_upload(
    connection: &Connection,
    rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    filename: &str,
    contents: &str,
) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let message = rx.recv().await.expect("outbound channel open");
            let frame: Value =
                serde_json::from_str(&encode_frame(&message).expect("encode")).expect("json");
            if let Some(id) = message.correlation_id() {
                let ack = json!({ "event": format!("file:{id}") }).to_string();
                assert!(matches!(
                    handle_inbound(connection, &ack),
                    Inbound::Acknowledged(_)
                ));
            }
            if frame["data"]["filename"] == json!(filename)
                && frame["data"]["contents"] == json!(contents)
            {
                return frame;
            }
        }
    })
    .await
    .expect("upload within timeout")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn existing_and_new_files_reach_the_client() {
    let daemon = Daemon::start(WatchConfig::default());
    let (connection, mut rx) = daemon.manager.connect().await.expect("connect");

    let initial = await_upload(&connection, &mut rx, "a.js", "console.log('a')").await;
    assert_eq!(initial["event"], json!("file:updated"));
    assert_eq!(initial["data"]["type"], json!("script"));
    assert_eq!(initial["data"]["path"], json!(""));

    fs::create_dir_all(daemon.root.path().join("styles")).expect("mkdir");
    fs::write(daemon.root.path().join("styles/site.css"), "body {}").expect("write");
    let created = await_upload(&connection, &mut rx, "site.css", "body {}").await;
    assert_eq!(created["data"]["path"], json!("styles"));
    assert_eq!(created["data"]["type"], json!("css"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_backend_picks_up_edits() {
    let daemon = Daemon::start(WatchConfig {
        poll: true,
        poll_interval_ms: 50,
        initial_sync: false,
    });
    let (connection, mut rx) = daemon.manager.connect().await.expect("connect");

    // Let the poller take its baseline snapshot before editing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(daemon.root.path().join("notes.txt"), "hello").expect("write");
    let frame = await_upload(&connection, &mut rx, "notes.txt", "hello").await;
    assert_eq!(frame["data"]["type"], json!("text"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn changes_while_disconnected_flow_to_next_client() {
    let daemon = Daemon::start(WatchConfig {
        initial_sync: false,
        ..WatchConfig::default()
    });
    let (first, _rx1) = daemon.manager.connect().await.expect("connect");
    daemon.manager.disconnect(&first);

    fs::write(daemon.root.path().join("late.json"), "{\"k\":1}").expect("write");
    // The watcher keeps queueing with nobody connected.
    tokio::time::timeout(WAIT, async {
        while daemon.manager.pipeline().queue().pending() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("event queued while disconnected");

    let (second, mut rx2) = daemon.manager.connect().await.expect("reconnect");
    let frame = await_upload(&second, &mut rx2, "late.json", "{\"k\":1}").await;
    assert_eq!(frame["data"]["type"], json!("json"));
}
