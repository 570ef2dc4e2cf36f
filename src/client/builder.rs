use super::{CentrifugeClient, ClientState, ConnectionManager};
use crate::infrastructure::Backoff;
use crate::messaging::EventHub;
use crate::transport::{TransportFactory, TransportOptions, WebSocketTransportFactory};
use crate::types::constants::{
    DEFAULT_NAME, DEFAULT_PRIVATE_CHANNEL_PREFIX, DEFAULT_TIMEOUT, EVENT_CHANNEL_CAPACITY,
    PING_INTERVAL,
};
use crate::types::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Maps a reconnect attempt number (1-based) to the delay before it.
pub type RetryFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Context handed to the private channel token callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateSubEvent {
    pub client: String,
    pub channel: String,
}

/// Resolves a subscription token for a private channel.
pub type PrivateSubCallback =
    Arc<dyn Fn(PrivateSubEvent) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Extra HTTP headers sent with the WebSocket upgrade request
    pub headers: Vec<(String, String)>,
    /// Keepalive ping period
    pub ping_interval: Duration,
    /// Timeout for the transport open and for every request
    pub timeout: Duration,
    /// Reconnect backoff
    pub retry: RetryFn,
    /// Client name sent in every handshake
    pub name: String,
    /// Client version sent in every handshake
    pub version: String,
    /// Channels starting with this prefix need a subscription token
    pub private_channel_prefix: String,
    pub on_private_subscribe: Option<PrivateSubCallback>,
    /// Events buffered per receiver before a slow receiver starts losing them
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Uses `backoff` as the retry policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.retry = Arc::new(move |attempt: u32| backoff.delay(attempt));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_private_subscribe(mut self, callback: PrivateSubCallback) -> Self {
        self.on_private_subscribe = Some(callback);
        self
    }

    pub fn is_private_channel(&self, channel: &str) -> bool {
        !self.private_channel_prefix.is_empty() && channel.starts_with(&self.private_channel_prefix)
    }

    pub(crate) fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            headers: self.headers.clone(),
            ping_interval: self.ping_interval,
            timeout: self.timeout,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            headers: Vec::new(),
            ping_interval: Duration::from_millis(PING_INTERVAL),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT),
            retry: Arc::new(move |attempt: u32| backoff.delay(attempt)),
            name: DEFAULT_NAME.to_string(),
            version: String::new(),
            private_channel_prefix: DEFAULT_PRIVATE_CHANNEL_PREFIX.to_string(),
            on_private_subscribe: None,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("headers", &self.headers)
            .field("ping_interval", &self.ping_interval)
            .field("timeout", &self.timeout)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("private_channel_prefix", &self.private_channel_prefix)
            .field("on_private_subscribe", &self.on_private_subscribe.is_some())
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

/// Builder for CentrifugeClient that handles initialization
pub struct ClientBuilder {
    url: String,
    config: ClientConfig,
    transport: Arc<dyn TransportFactory>,
}

impl ClientBuilder {
    /// Create a new builder. Fails if `url` is not a valid URL.
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let url = url.into();
        Url::parse(&url)?;

        Ok(Self {
            url,
            config,
            transport: Arc::new(WebSocketTransportFactory),
        })
    }

    /// Replace the default WebSocket transport.
    pub fn with_transport(mut self, transport: Arc<dyn TransportFactory>) -> Self {
        self.transport = transport;
        self
    }

    pub fn build(self) -> CentrifugeClient {
        let events = EventHub::with_capacity(self.config.event_capacity);
        CentrifugeClient {
            url: Arc::from(self.url),
            config: Arc::new(self.config),
            transport: self.transport,
            connection: Arc::new(ConnectionManager::new()),
            state: Arc::new(RwLock::new(ClientState::new())),
            events: Arc::new(events),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }
}
