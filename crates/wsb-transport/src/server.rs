//! Application-facing WebSocket server using Axum.
//!
//! Each upgraded connection gets its own session. Text frames are fed to the
//! session as commands and the session's events are written back as text
//! frames. When the client goes away the session is shut down, which closes
//! every upstream it opened.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wsb_session::{SessionConfig, spawn_session};
use wsb_socket::Connector;

use crate::client::AppClient;

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent application clients
    pub max_connections: Option<usize>,
    /// Settings for every session this server starts
    pub session: SessionConfig,
    /// Log every event frame sent to clients
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7071,
            hostname: "127.0.0.1".into(),
            max_connections: Some(32),
            session: SessionConfig::default(),
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {addr:?}: {source}")]
    Address {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Shared state for the transport server.
struct AppState {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    /// Connected client count (for health check)
    client_count: Arc<AtomicUsize>,
}

/// The transport server: accepts application clients and runs their sessions.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
    client_count: Arc<AtomicUsize>,
}

impl TransportServer {
    /// Bind and start serving. Upstream sockets are built with `connector`.
    pub async fn start(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let client_count = Arc::new(AtomicUsize::new(0));

        let state = Arc::new(AppState {
            connector,
            config: config.clone(),
            client_count: client_count.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        let raw = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = raw.parse().map_err(|source| TransportError::Address {
            addr: raw.clone(),
            source,
        })?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?
            .port();

        info!("ws-bridge listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                error!("Transport server failed: {e}");
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
            client_count,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Application clients currently connected.
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("ws-bridge transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let mut client = AppClient::new(uuid::Uuid::new_v4().to_string());
    info!("Client connected: {}", client.id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (session, mut events) = spawn_session(state.connector.clone(), state.config.session);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        client.record_command();
                        if !session.submit_text(text.as_str()) {
                            error!("Session for {} stopped unexpectedly", client.id);
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        client.record_ignored();
                        warn!("Ignoring {} byte binary frame from {}", data.len(), client.id);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client disconnected: {}", client.id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {e}", client.id);
                        break;
                    }
                    _ => {}
                }
            }

            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if state.config.verbose_logging {
                    debug!(client = %client.id, handle = %event.handle(), "-> {}", event.kind());
                }
                if let Err(e) = ws_tx.send(Message::Text(event.encode().into())).await {
                    error!("Failed to send event to {}: {e}", client.id);
                    break;
                }
                client.record_event();
            }
        }
    }

    session.shutdown().await;

    state.client_count.fetch_sub(1, Ordering::Relaxed);
    info!(
        commands = client.commands,
        events = client.events,
        ignored = client.ignored,
        "Client disconnected: {} after {:?} (total: {})",
        client.id,
        client.uptime(),
        state.client_count.load(Ordering::Relaxed)
    );
}
