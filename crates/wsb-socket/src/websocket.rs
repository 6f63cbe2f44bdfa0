//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each transport runs one spawned task that owns the socket. The transport
//! handle talks to it through an unbounded queue, so `send`/`close` never
//! block the caller.

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};
use wsb_protocol::{DEFAULT_CLOSE_CODE, Protocols};

use crate::error::SocketError;
use crate::policy::ConnectPolicy;
use crate::transport::{CallbackSink, CallbackSlot, CloseInfo, Connector, Payload, Transport};

/// How long to wait for the peer to answer our close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector for real WebSocket upstreams.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    policy: ConnectPolicy,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(policy: ConnectPolicy) -> Self {
        Self {
            policy,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn build_request(&self, url: &str, protocols: &Protocols) -> Result<Request, SocketError> {
        let target = self.policy.check(url, protocols)?;
        if target.secure && !cfg!(feature = "tls") {
            return Err(SocketError::invalid_url(
                url,
                "wss:// requires the `tls` feature",
            ));
        }

        let mut request = target
            .uri
            .into_client_request()
            .map_err(|e| SocketError::invalid_url(url, e.to_string()))?;
        if let Some(header) = protocols.header_value() {
            let value = HeaderValue::from_str(&header)
                .map_err(|_| SocketError::InvalidProtocol(header.clone()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        Ok(request)
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(ConnectPolicy::default())
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        url: &str,
        protocols: &Protocols,
        sink: CallbackSink,
    ) -> Result<Box<dyn Transport>, SocketError> {
        let request = self.build_request(url, protocols)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SocketError::Unavailable(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let slot = CallbackSlot::new(sink);
        runtime.spawn(run_socket(
            request,
            outbound_rx,
            slot.clone(),
            self.connect_timeout,
        ));

        Ok(Box::new(WebSocketTransport {
            outbound: outbound_tx,
            slot,
        }))
    }
}

/// Instruction from the transport handle to its socket task.
#[derive(Debug)]
enum Outbound {
    Send(String),
    Close { code: u16, reason: String },
}

/// Handle to a socket task. Dropping it starts a normal close.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    slot: CallbackSlot,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, data: String) {
        if self.outbound.send(Outbound::Send(data)).is_err() {
            self.slot.on_error("websocket is no longer running");
        }
    }

    fn close(&mut self, code: u16, reason: String) {
        let _ = self.outbound.send(Outbound::Close { code, reason });
    }

    fn detach(&mut self) {
        self.slot.detach();
    }
}

async fn run_socket(
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    slot: CallbackSlot,
    connect_timeout: Duration,
) {
    let url = request.uri().to_string();

    // Connecting: a close (or a dropped handle) aborts the attempt.
    let connect = tokio::time::timeout(connect_timeout, connect_async(request));
    tokio::pin!(connect);
    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(Ok((ws, _response))) => break ws,
                Ok(Err(e)) => {
                    debug!("Connect to {url} failed: {e}");
                    slot.on_error(format!("connection to {url} failed: {e}"));
                    slot.on_close(CloseInfo::abnormal());
                    return;
                }
                Err(_) => {
                    debug!("Connect to {url} timed out");
                    slot.on_error(format!(
                        "connection to {url} timed out after {}ms",
                        connect_timeout.as_millis()
                    ));
                    slot.on_close(CloseInfo::abnormal());
                    return;
                }
            },
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Send(_)) => {
                    slot.on_error("cannot send before the websocket is open");
                }
                Some(Outbound::Close { .. }) | None => {
                    slot.on_error("websocket closed before the connection was established");
                    slot.on_close(CloseInfo::abnormal());
                    return;
                }
            },
        }
    };

    slot.on_open();
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut outbound_open = true;
    let mut close_deadline: Option<tokio::time::Instant> = None;
    let mut remote_close: Option<CloseInfo> = None;

    let info = loop {
        let close_wait = async move {
            match close_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    slot.on_message(Payload::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    slot.on_message(Payload::Binary(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    let info = match frame {
                        Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.as_str()),
                        None => CloseInfo::clean(1005, ""),
                    };
                    debug!("Close frame from {url}: {} {:?}", info.code, info.reason);
                    remote_close = Some(info);
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    break remote_close.take().unwrap_or_else(CloseInfo::abnormal);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error on {url}: {e}");
                    slot.on_error(e.to_string());
                    break remote_close.take().unwrap_or_else(CloseInfo::abnormal);
                }
            },

            cmd = outbound.recv(), if outbound_open => match cmd {
                Some(Outbound::Send(data)) => {
                    if close_deadline.is_some() {
                        slot.on_error("cannot transmit on a closing websocket");
                    } else if let Err(e) = ws_tx.send(Message::Text(data.into())).await {
                        slot.on_error(format!("send failed: {e}"));
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    if close_deadline.is_none() {
                        close_deadline = Some(tokio::time::Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
                        if let Err(e) = send_close(&mut ws_tx, code, reason).await {
                            slot.on_error(format!("close failed: {e}"));
                            break CloseInfo::abnormal();
                        }
                    }
                }
                None => {
                    outbound_open = false;
                    if close_deadline.is_none() {
                        close_deadline = Some(tokio::time::Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);
                        let _ = send_close(&mut ws_tx, DEFAULT_CLOSE_CODE, String::new()).await;
                    }
                }
            },

            _ = close_wait => {
                debug!("Closing handshake with {url} timed out");
                break CloseInfo::abnormal();
            }
        }
    };

    debug!("Socket {url} finished: code={} clean={}", info.code, info.was_clean);
    slot.on_close(info);
}

async fn send_close<S>(ws_tx: &mut S, code: u16, reason: String) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    ws_tx.send(Message::Close(Some(frame))).await
}
