use super::{ClientConfig, ClientState, ConnectionManager, PrivateSubEvent};
use crate::types::{CentrifugeError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Non-owning view of a client, held by its subscriptions.
///
/// The client registry owns the subscriptions, so the back-reference is weak;
/// once the client is dropped every call fails with `Closed`.
#[derive(Clone)]
pub struct ClientHandle {
    connection: Weak<ConnectionManager>,
    state: Weak<RwLock<ClientState>>,
    config: Arc<ClientConfig>,
}

impl ClientHandle {
    pub(crate) fn new(
        connection: &Arc<ConnectionManager>,
        state: &Arc<RwLock<ClientState>>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            connection: Arc::downgrade(connection),
            state: Arc::downgrade(state),
            config,
        }
    }

    pub fn event_capacity(&self) -> usize {
        self.config.event_capacity
    }

    fn connection(&self) -> Result<Arc<ConnectionManager>> {
        self.connection.upgrade().ok_or(CentrifugeError::Closed)
    }

    pub async fn request<P, R>(&self, method: u8, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.connection()?.request(method, params).await
    }

    pub async fn is_connected(&self) -> bool {
        match self.connection.upgrade() {
            Some(connection) => connection.is_connected().await,
            None => false,
        }
    }

    /// Generation of the transport currently in use.
    pub fn generation(&self) -> u64 {
        self.connection
            .upgrade()
            .map(|connection| connection.generation())
            .unwrap_or_default()
    }

    /// Tears down the transport of `generation`; the client then reconnects.
    pub async fn abort_connection(&self, generation: u64, reason: &str) {
        if let Some(connection) = self.connection.upgrade() {
            connection.fail(generation, reason).await;
        }
    }

    /// Resolves the subscription token for `channel`.
    ///
    /// Returns `None` for public channels and while no client id is known.
    pub async fn private_token(&self, channel: &str) -> Result<Option<String>> {
        if !self.config.is_private_channel(channel) {
            return Ok(None);
        }

        let state = self.state.upgrade().ok_or(CentrifugeError::Closed)?;
        let Some(client) = state.read().await.client_id.clone() else {
            return Ok(None);
        };

        let callback = self.config.on_private_subscribe.as_ref().ok_or_else(|| {
            CentrifugeError::Token(format!(
                "channel '{}' is private but no token callback is configured",
                channel
            ))
        })?;

        tracing::debug!("Requesting private token for channel {}", channel);
        let token = callback(PrivateSubEvent {
            client,
            channel: channel.to_string(),
        })
        .await?;
        Ok(Some(token))
    }
}
