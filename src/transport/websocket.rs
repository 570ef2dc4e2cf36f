use super::{Transport, TransportEvent, TransportEvents, TransportFactory, TransportOptions};
use crate::infrastructure::{HeartbeatManager, TaskManager};
use crate::types::constants::WS_CLOSE_NORMAL;
use crate::types::protocol::{Command, PushEnvelope, decode_replies};
use crate::types::{CentrifugeError, Result};
use futures::future::BoxFuture;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type PendingRequests = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Close reason payload some servers put in the close frame.
#[derive(Debug, Deserialize)]
struct CloseReason {
    #[serde(default)]
    reason: String,
    #[serde(default = "default_reconnect")]
    reconnect: bool,
}

fn default_reconnect() -> bool {
    true
}

/// Maps a close frame to `(reason, reconnect)`. Only an explicit
/// `"reconnect": false` in a JSON reason disables reconnecting.
fn parse_close_reason(code: u16, raw: &str) -> (String, bool) {
    match serde_json::from_str::<CloseReason>(raw) {
        Ok(parsed) => (parsed.reason, parsed.reconnect),
        Err(_) if raw.is_empty() => (format!("connection closed ({})", code), true),
        Err(_) => (raw.to_string(), true),
    }
}

/// WebSocket transport speaking the JSON protocol.
pub struct WebSocketTransport {
    writer: Mutex<Option<WsSink>>,
    pending: PendingRequests,
    next_id: AtomicU32,
    timeout: Duration,
    // Read side gone; set by the read task or by shutdown
    closed: Arc<AtomicBool>,
    shut_down: AtomicBool,
    tasks: StdMutex<TaskManager>,
}

impl WebSocketTransport {
    async fn request(&self, method: u8, params: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CentrifugeError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&Command::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            let sent = match writer.as_mut() {
                Some(ws) => ws.send(Message::Text(text.into())).await,
                None => {
                    self.pending.lock().await.remove(&id);
                    return Err(CentrifugeError::Closed);
                }
            };
            if let Err(e) = sent {
                self.pending.lock().await.remove(&id);
                return Err(e.into());
            }
        }
        tracing::debug!("Sent command id={} method={}", id, method);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CentrifugeError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CentrifugeError::Timeout)
            }
        }
    }

    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed.store(true, Ordering::Release);

        if let Some(mut ws) = self.writer.lock().await.take()
            && let Err(e) = ws.close().await
        {
            tracing::debug!("WebSocket close handshake failed: {}", e);
        }
        fail_pending(&self.pending).await;

        // Last step: this may abort the task currently running shutdown
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.abort_all();
        }
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, method: u8, params: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(self.request(method, params))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}

async fn fail_pending(pending: &PendingRequests) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(CentrifugeError::Closed));
    }
}

async fn read_loop(
    mut read_half: SplitStream<WsStream>,
    pending: PendingRequests,
    closed: Arc<AtomicBool>,
    events: TransportEvents,
) {
    tracing::info!("Starting read task");
    let mut outcome = TransportEvent::Closed {
        reason: "connection closed".to_string(),
        reconnect: true,
    };

    while let Some(msg_result) = read_half.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                for reply in decode_replies(&text) {
                    let reply = match reply {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::warn!("Failed to parse reply: {} - Raw: {}", e, &*text);
                            continue;
                        }
                    };

                    if reply.is_push() {
                        let Some(result) = reply.result else {
                            continue;
                        };
                        match serde_json::from_value::<PushEnvelope>(result) {
                            Ok(envelope) => {
                                let _ = events.send(TransportEvent::Push(envelope));
                            }
                            Err(e) => tracing::warn!("Malformed push envelope: {}", e),
                        }
                        continue;
                    }

                    let id = reply.id;
                    match pending.lock().await.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(reply.into_result());
                        }
                        None => tracing::debug!("Reply for unknown request id {}", id),
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                let (reason, reconnect) = match frame {
                    Some(close_frame) => {
                        parse_close_reason(u16::from(close_frame.code), &close_frame.reason)
                    }
                    None => (format!("connection closed ({})", WS_CLOSE_NORMAL), true),
                };
                tracing::warn!(
                    "Server closed connection: reason='{}', reconnect={}",
                    reason,
                    reconnect
                );
                outcome = TransportEvent::Closed { reason, reconnect };
                break;
            }
            Ok(Message::Ping(data)) => tracing::debug!("Received ping ({} bytes)", data.len()),
            Ok(Message::Pong(data)) => tracing::debug!("Received pong ({} bytes)", data.len()),
            Ok(Message::Binary(data)) => {
                tracing::warn!("Received unexpected binary message ({} bytes)", data.len())
            }
            Ok(Message::Frame(_)) => tracing::debug!("Received raw frame (internal)"),
            Err(e) => {
                tracing::error!("WebSocket read error: {}", e);
                outcome = TransportEvent::Error(e.to_string());
                break;
            }
        }
    }

    closed.store(true, Ordering::Release);
    fail_pending(&pending).await;
    let _ = events.send(outcome);
    tracing::info!("Read task finished");
}

/// Opens [`WebSocketTransport`]s with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransportFactory;

impl WebSocketTransportFactory {
    async fn connect(
        &self,
        url: &str,
        options: &TransportOptions,
        events: TransportEvents,
    ) -> Result<Arc<WebSocketTransport>> {
        let mut request = url.into_client_request()?;
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                CentrifugeError::Connection(format!("invalid header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                CentrifugeError::Connection(format!("invalid header value for '{}': {}", name, e))
            })?;
            request.headers_mut().insert(header_name, header_value);
        }

        tracing::debug!("Creating WebSocket connection to: {}", url);
        let (ws_stream, _response) =
            tokio::time::timeout(options.timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| CentrifugeError::Timeout)??;
        let (write_half, read_half) = ws_stream.split();

        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = Arc::new(WebSocketTransport {
            writer: Mutex::new(Some(write_half)),
            pending: Arc::clone(&pending),
            next_id: AtomicU32::new(1),
            timeout: options.timeout,
            closed: Arc::clone(&closed),
            shut_down: AtomicBool::new(false),
            tasks: StdMutex::new(TaskManager::new()),
        });

        let as_dyn: Arc<dyn Transport> = transport.clone();
        let heartbeat = HeartbeatManager::new(Arc::downgrade(&as_dyn), events.clone())
            .with_interval(options.ping_interval)
            .spawn();

        if let Ok(mut tasks) = transport.tasks.lock() {
            tasks.spawn(read_loop(read_half, pending, closed, events));
            tasks.track(heartbeat);
        }

        Ok(transport)
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn open<'a>(
        &'a self,
        url: &'a str,
        options: &'a TransportOptions,
        events: TransportEvents,
    ) -> BoxFuture<'a, Result<Arc<dyn Transport>>> {
        Box::pin(async move {
            let transport: Arc<dyn Transport> = self.connect(url, options, events).await?;
            Ok(transport)
        })
    }
}
