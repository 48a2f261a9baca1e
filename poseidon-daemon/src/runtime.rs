use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};

use poseidon_core::{DaemonConfig, TlsConfig};
use poseidon_sync::{EventTranslator, GuessMimeResolver, PipelineContext};

use crate::error::{io_err, DaemonError};
use crate::manager::ConnectionManager;
use crate::protocol::{encode_frame, handle_inbound};

/// How long open sockets get to close after shutdown when serving TLS.
const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub config: Arc<DaemonConfig>,
    pub shutdown: broadcast::Sender<()>,
    pub started_at_unix: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let translator = EventTranslator::new(&config.root, GuessMimeResolver, config.mime_failure);
    let (pipeline, worker_handle) = PipelineContext::start(translator, shutdown_tx.subscribe());
    let manager = Arc::new(ConnectionManager::new(pipeline, &config));

    let tls = match &config.tls {
        Some(tls) => Some(load_tls(tls).await?),
        None => None,
    };
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })?;
    print_banner(&config);

    let state = AppState {
        manager: manager.clone(),
        config: Arc::new(config),
        shutdown: shutdown_tx.clone(),
        started_at_unix: unix_seconds_now(),
    };
    let app = router(state);

    let server_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = serve(listener, app, tls, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (server_result, signal_result, worker_result) =
        tokio::join!(server_handle, signal_handle, worker_handle);

    manager.stop_watching();
    handle_join("http_server", server_result)?;
    handle_join("signal_handler", signal_result)?;
    handle_join("change_queue", worker_result.map(Ok))?;
    Ok(())
}

/// Serve `app` on `listener` until shutdown, over TLS when `tls` is set.
async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<RustlsConfig>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(tls) = tls else {
        return axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .map_err(|e| io_err("http-server", e));
    };

    let listener = listener.into_std().map_err(|e| io_err("https-server", e))?;
    let handle = Handle::new();
    let stopper = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown_rx.recv().await;
        stopper.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
    });
    axum_server::from_tcp_rustls(listener, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| io_err("https-server", e))
}

/// Read the PEM certificate chain and key named by `tls`.
async fn load_tls(tls: &TlsConfig) -> Result<RustlsConfig, DaemonError> {
    RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .map_err(|source| DaemonError::Tls {
            cert: tls.cert.clone(),
            key: tls.key.clone(),
            source,
        })
}

/// HTTP surface: liveness at `/`, JSON status at `/status`, client socket at `/ws`.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    Router::new()
        .route("/", get(|| async { "..." }))
        .route("/status", get(status))
        .route("/ws", get(ws_upgrade))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        // Credentials forbid a literal wildcard; echo the request origin instead.
        AllowOrigin::mirror_request()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(origin = %origin, error = %err, "ignoring invalid origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_credentials(true)
}

/// An absent `Origin` header (non-browser client) is accepted.
fn origin_permitted(headers: &HeaderMap, config: &DaemonConfig) -> bool {
    match headers.get(header::ORIGIN) {
        None => true,
        Some(origin) => origin
            .to_str()
            .map(|origin| config.is_origin_allowed(origin))
            .unwrap_or(false),
    }
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(build_status_payload(&state))
}

fn build_status_payload(state: &AppState) -> Value {
    let pipeline = state.manager.pipeline();
    let current = pipeline.current();
    json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "started_at_unix": state.started_at_unix,
        "connected": current.is_some(),
        "connection_id": current.as_ref().map(|c| c.id()),
        "queued": pipeline.queue().pending(),
        "outstanding": current.as_ref().map_or(0, |c| c.outstanding()),
        "watching": state.manager.is_watching(),
        "watch_root": state.manager.root().display().to_string(),
    })
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if !origin_permitted(&headers, &state.config) {
        tracing::warn!(origin = ?headers.get(header::ORIGIN), "rejected client from disallowed origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_client(socket, state).await {
            tracing::error!(error = %err, "client connection error");
        }
    })
}

async fn handle_client(socket: WebSocket, state: AppState) -> Result<(), DaemonError> {
    let mut shutdown_rx = state.shutdown.subscribe();
    let (connection, mut outbound) = state.manager.connect().await?;
    let (mut sink, mut stream) = socket.split();

    let result = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break Ok(()),
            // Replaced by a newer client.
            _ = connection.severed() => break Ok(()),
            message = outbound.recv() => {
                let Some(message) = message else { break Ok(()) };
                let frame = match encode_frame(&message) {
                    Ok(frame) => frame,
                    Err(err) => break Err(err),
                };
                if let Err(err) = sink.send(Message::Text(frame.into())).await {
                    tracing::debug!(connection = connection.id(), error = %err, "send failed");
                    break Ok(());
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_inbound(&connection, text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(connection = connection.id(), error = %err, "receive failed");
                    break Ok(());
                }
            },
        }
    };

    state.manager.disconnect(&connection);
    let _ = sink.close().await;
    result
}

fn print_banner(config: &DaemonConfig) {
    tracing::info!("Poseidon remote coding server");
    tracing::info!(
        addr = %config.socket_addr(),
        root = %config.root.display(),
        tls = config.tls.is_some(),
        "server available on port {}",
        config.port,
    );
    tracing::info!("development server running, use Ctrl+C to quit");
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
