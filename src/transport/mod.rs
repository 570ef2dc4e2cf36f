//! Transport seam between the orchestrator and the network.
//!
//! A [`TransportFactory`] opens one duplex connection per connect attempt.
//! The resulting [`Transport`] multiplexes request/response exchanges, while
//! pushes and connection loss are reported asynchronously as
//! [`TransportEvent`]s on the channel handed to `open`.

mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use websocket::{WebSocketTransport, WebSocketTransportFactory};

use crate::types::Result;
use crate::types::protocol::PushEnvelope;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Asynchronous notifications produced by an open transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Server push frame, payload still undecoded
    Push(PushEnvelope),
    /// The connection failed; always followed by a reconnect
    Error(String),
    /// The connection closed
    Closed { reason: String, reconnect: bool },
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Options forwarded opaquely to the transport.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub headers: Vec<(String, String)>,
    pub ping_interval: Duration,
    pub timeout: Duration,
}

/// An open connection able to run request/response exchanges.
pub trait Transport: Send + Sync {
    /// Sends a command and resolves with the reply's result payload.
    fn send(&self, method: u8, params: Value) -> BoxFuture<'_, Result<Value>>;

    /// Releases the connection. In-flight requests fail with `Closed`.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Opens transports. Resolves once the connection is usable.
pub trait TransportFactory: Send + Sync {
    fn open<'a>(
        &'a self,
        url: &'a str,
        options: &'a TransportOptions,
        events: TransportEvents,
    ) -> BoxFuture<'a, Result<Arc<dyn Transport>>>;
}
