use crate::transport::{Transport, TransportEvent, TransportEvents};
use crate::types::{CentrifugeError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ActiveTransport {
    transport: Arc<dyn Transport>,
    events: TransportEvents,
}

/// Owns the current transport and the connection state.
///
/// Every installed transport gets a new generation number; events and
/// failures tagged with an older generation belong to a transport that has
/// already been replaced.
pub struct ConnectionManager {
    active: RwLock<Option<ActiveTransport>>,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            generation: AtomicU64::new(0),
        }
    }

    /// Gets the current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Sets the connection state
    pub async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            tracing::debug!("Connection state {:?} -> {:?}", *state, new_state);
        }
        *state = new_state;
    }

    /// Checks if currently connected
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts a new generation. Returns its number.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Installs a freshly opened transport, replacing any previous one.
    pub async fn install(&self, transport: Arc<dyn Transport>, events: TransportEvents) {
        *self.active.write().await = Some(ActiveTransport { transport, events });
    }

    /// Removes the current transport so it can be closed.
    pub async fn take_transport(&self) -> Option<Arc<dyn Transport>> {
        self.active.write().await.take().map(|active| active.transport)
    }

    /// Sends a command over the current transport. Requires `Connected`.
    pub async fn request<P, R>(&self, method: u8, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !self.is_connected().await {
            return Err(CentrifugeError::NotConnected);
        }

        let transport = self
            .active
            .read()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.transport))
            .ok_or(CentrifugeError::NotConnected)?;

        let result = transport.send(method, serde_json::to_value(params)?).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Reports the transport of `generation` as failed. Ignored when that
    /// transport has already been replaced.
    pub async fn fail(&self, generation: u64, reason: &str) {
        if generation != self.generation() {
            return;
        }
        if let Some(active) = self.active.read().await.as_ref() {
            let _ = active.events.send(TransportEvent::Error(reason.to_string()));
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
