use crate::types::constants::EVENT_CHANNEL_CAPACITY;
use crate::types::{ClientInfo, Publication};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Emitted after every successful handshake.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectEvent {
    pub client: String,
    pub version: String,
    pub data: Option<Value>,
}

/// Emitted once per disconnect processing, whether or not a reconnect follows.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DisconnectEvent {
    pub reason: String,
    pub reconnect: bool,
}

/// Asynchronous channel-less message from the server.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageEvent {
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerSubscribeEvent {
    pub channel: String,
    pub recoverable: bool,
    pub offset: u64,
    pub epoch: String,
    pub is_resubscribed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerUnsubscribeEvent {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerPublishEvent {
    pub channel: String,
    pub publication: Publication,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerJoinEvent {
    pub channel: String,
    pub info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerLeaveEvent {
    pub channel: String,
    pub info: ClientInfo,
}

/// A single fan-out stream. Every receiver sees events in emission order.
///
/// Each receiver buffers up to `capacity` events. A receiver that falls
/// further behind gets [`RecvError::Lagged`](broadcast::error::RecvError::Lagged)
/// with the number of skipped events and then resumes at the oldest one
/// still buffered. Emitting never waits for slow receivers.
#[derive(Debug)]
pub struct Broadcaster<T: Clone> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Broadcaster<T> {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Registers a new observer. Only events emitted after this call are seen.
    /// See the type docs for what happens when it falls behind.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: T) {
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One independent stream per client-level event category.
///
/// The `on_*` methods hand out [`broadcast::Receiver`]s. A receiver that
/// lags more than [`ClientConfig::event_capacity`](crate::ClientConfig::event_capacity)
/// events behind loses the oldest ones and is told so through
/// `RecvError::Lagged`.
#[derive(Debug, Default)]
pub struct EventHub {
    pub(crate) connect: Broadcaster<ConnectEvent>,
    pub(crate) disconnect: Broadcaster<DisconnectEvent>,
    pub(crate) message: Broadcaster<MessageEvent>,
    pub(crate) server_subscribe: Broadcaster<ServerSubscribeEvent>,
    pub(crate) server_unsubscribe: Broadcaster<ServerUnsubscribeEvent>,
    pub(crate) server_publish: Broadcaster<ServerPublishEvent>,
    pub(crate) server_join: Broadcaster<ServerJoinEvent>,
    pub(crate) server_leave: Broadcaster<ServerLeaveEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connect: Broadcaster::with_capacity(capacity),
            disconnect: Broadcaster::with_capacity(capacity),
            message: Broadcaster::with_capacity(capacity),
            server_subscribe: Broadcaster::with_capacity(capacity),
            server_unsubscribe: Broadcaster::with_capacity(capacity),
            server_publish: Broadcaster::with_capacity(capacity),
            server_join: Broadcaster::with_capacity(capacity),
            server_leave: Broadcaster::with_capacity(capacity),
        }
    }

    pub fn on_connect(&self) -> broadcast::Receiver<ConnectEvent> {
        self.connect.subscribe()
    }

    pub fn on_disconnect(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.disconnect.subscribe()
    }

    pub fn on_message(&self) -> broadcast::Receiver<MessageEvent> {
        self.message.subscribe()
    }

    pub fn on_server_subscribe(&self) -> broadcast::Receiver<ServerSubscribeEvent> {
        self.server_subscribe.subscribe()
    }

    pub fn on_server_unsubscribe(&self) -> broadcast::Receiver<ServerUnsubscribeEvent> {
        self.server_unsubscribe.subscribe()
    }

    pub fn on_server_publish(&self) -> broadcast::Receiver<ServerPublishEvent> {
        self.server_publish.subscribe()
    }

    pub fn on_server_join(&self) -> broadcast::Receiver<ServerJoinEvent> {
        self.server_join.subscribe()
    }

    pub fn on_server_leave(&self) -> broadcast::Receiver<ServerLeaveEvent> {
        self.server_leave.subscribe()
    }
}
