use super::state::{SubscriptionState, SubscriptionStatus};
use crate::client::ClientHandle;
use crate::messaging::Broadcaster;
use crate::types::constants::{methods, reasons};
use crate::types::protocol::{
    ChannelRequest, HistoryResult, PresenceResult, PresenceStatsResult, PublishRequest,
    SubscribeRequest, SubscribeResult,
};
use crate::types::{CentrifugeError, ClientInfo, Publication, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{Mutex, broadcast};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscribeSuccessEvent {
    /// False only for the first successful subscribe of this object
    pub is_resubscribed: bool,
    /// The server replayed every publication missed while unsubscribed
    pub is_recovered: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscribeErrorEvent {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnsubscribeEvent {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishEvent {
    pub publication: Publication,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JoinEvent {
    pub info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeaveEvent {
    pub info: ClientInfo,
}

#[derive(Debug)]
struct SubscriptionEvents {
    subscribe_success: Broadcaster<SubscribeSuccessEvent>,
    subscribe_error: Broadcaster<SubscribeErrorEvent>,
    unsubscribe: Broadcaster<UnsubscribeEvent>,
    publish: Broadcaster<PublishEvent>,
    join: Broadcaster<JoinEvent>,
    leave: Broadcaster<LeaveEvent>,
}

impl SubscriptionEvents {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribe_success: Broadcaster::with_capacity(capacity),
            subscribe_error: Broadcaster::with_capacity(capacity),
            unsubscribe: Broadcaster::with_capacity(capacity),
            publish: Broadcaster::with_capacity(capacity),
            join: Broadcaster::with_capacity(capacity),
            leave: Broadcaster::with_capacity(capacity),
        }
    }
}

/// An application-managed channel subscription.
///
/// Created through [`CentrifugeClient::get_subscription`](crate::CentrifugeClient::get_subscription).
/// The subscription remembers that it is wanted and re-subscribes on its own
/// after every reconnect until [`unsubscribe`](Self::unsubscribe) is called.
///
/// Event receivers from the `on_*` methods lag like the client-level ones:
/// past [`ClientConfig::event_capacity`](crate::ClientConfig::event_capacity)
/// unread events the oldest are dropped and `recv` reports `Lagged`.
pub struct Subscription {
    channel: String,
    client: ClientHandle,
    state: Mutex<SubscriptionState>,
    events: SubscriptionEvents,
}

impl Subscription {
    pub(crate) fn new(channel: impl Into<String>, client: ClientHandle) -> Self {
        let events = SubscriptionEvents::with_capacity(client.event_capacity());
        Self {
            channel: channel.into(),
            client,
            state: Mutex::new(SubscriptionState::new()),
            events,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn status(&self) -> SubscriptionStatus {
        self.state.lock().await.status
    }

    pub async fn is_subscribed(&self) -> bool {
        self.status().await == SubscriptionStatus::Subscribed
    }

    /// Subscribes to the channel.
    ///
    /// While the client is not connected this only records the intent; the
    /// subscribe request goes out after the next successful connect. Server
    /// rejections are returned and also emitted as subscribe-error events.
    pub async fn subscribe(&self) -> Result<()> {
        match self.start_attempt(true).await {
            Some(attempt) => self.run_subscribe(attempt).await,
            None => Ok(()),
        }
    }

    /// Re-issues the subscribe request if the subscription is wanted but
    /// currently inactive. No-op otherwise.
    pub async fn resubscribe_if_needed(&self) {
        let Some(attempt) = self.start_attempt(false).await else {
            return;
        };
        if let Err(e) = self.run_subscribe(attempt).await {
            tracing::warn!("Resubscribe to {} failed: {}", self.channel, e);
        }
    }

    async fn start_attempt(&self, wanted: bool) -> Option<u64> {
        let connected = self.client.is_connected().await;
        let mut state = self.state.lock().await;
        if wanted {
            state.wants = true;
        }
        if !state.wants || state.status != SubscriptionStatus::Unsubscribed {
            return None;
        }
        if !connected {
            tracing::debug!("Subscribe to {} deferred until connected", self.channel);
            return None;
        }
        Some(state.begin_attempt())
    }

    async fn run_subscribe(&self, attempt: u64) -> Result<()> {
        let generation = self.client.generation();

        let token = match self.client.private_token(&self.channel).await {
            Ok(token) => token,
            Err(e) => {
                self.on_subscribe_failed(attempt, generation, &e).await;
                return Err(e);
            }
        };

        let request = {
            let state = self.state.lock().await;
            let recover = state.should_recover();
            SubscribeRequest {
                channel: self.channel.clone(),
                token,
                recover,
                offset: if recover { state.offset } else { 0 },
                epoch: if recover {
                    state.epoch.clone()
                } else {
                    String::new()
                },
            }
        };

        tracing::debug!(
            "Subscribing to {} (recover={}, offset={})",
            self.channel,
            request.recover,
            request.offset
        );
        match self
            .client
            .request::<_, SubscribeResult>(methods::SUBSCRIBE, &request)
            .await
        {
            Ok(result) => {
                self.on_subscribed(attempt, result).await;
                Ok(())
            }
            Err(e) => {
                self.on_subscribe_failed(attempt, generation, &e).await;
                Err(e)
            }
        }
    }

    async fn on_subscribed(&self, attempt: u64, result: SubscribeResult) {
        let event = {
            let mut state = self.state.lock().await;
            if !state.is_current(attempt) {
                tracing::debug!("Ignoring stale subscribe result for {}", self.channel);
                return;
            }
            state.status = SubscriptionStatus::Subscribed;
            state.recoverable = result.recoverable;
            if result.recoverable {
                state.offset = result.offset;
                state.epoch = result.epoch.clone();
            }
            let is_resubscribed = state.subscribed_once;
            state.subscribed_once = true;
            SubscribeSuccessEvent {
                is_resubscribed,
                is_recovered: result.recovered,
            }
        };

        tracing::info!("Subscribed to {}", self.channel);
        self.events.subscribe_success.emit(event);
        for publication in result.publications {
            self.add_publish(publication).await;
        }
    }

    async fn on_subscribe_failed(&self, attempt: u64, generation: u64, error: &CentrifugeError) {
        {
            let mut state = self.state.lock().await;
            if !state.is_current(attempt) {
                return;
            }
            state.reset();
        }

        match error {
            CentrifugeError::Closed | CentrifugeError::NotConnected => {
                tracing::debug!("Subscribe to {} interrupted by disconnect", self.channel);
            }
            CentrifugeError::Server { code, message } => {
                tracing::warn!("Subscribe to {} rejected: {} {}", self.channel, code, message);
                self.events.subscribe_error.emit(SubscribeErrorEvent {
                    code: *code,
                    message: message.clone(),
                });
            }
            CentrifugeError::Token(message) => {
                tracing::warn!("No token for {}: {}", self.channel, message);
                self.events.subscribe_error.emit(SubscribeErrorEvent {
                    code: 0,
                    message: message.clone(),
                });
            }
            other => {
                tracing::error!("Subscribe to {} failed: {}", self.channel, other);
                self.events.subscribe_error.emit(SubscribeErrorEvent {
                    code: 0,
                    message: other.to_string(),
                });
                self.client
                    .abort_connection(generation, reasons::SUBSCRIBE_FAILED)
                    .await;
            }
        }
    }

    /// Unsubscribes and stops resubscribing after reconnects.
    ///
    /// Emits one unsubscribe event if the subscription was active. A failed
    /// unsubscribe request is returned to the caller.
    pub async fn unsubscribe(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().await;
            state.wants = false;
            state.reset()
        };
        if previous == SubscriptionStatus::Unsubscribed {
            return Ok(());
        }

        let outcome = if self.client.is_connected().await {
            self.client
                .request::<_, Value>(
                    methods::UNSUBSCRIBE,
                    &ChannelRequest {
                        channel: self.channel.clone(),
                    },
                )
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        if previous == SubscriptionStatus::Subscribed {
            self.emit_unsubscribe();
        }
        tracing::info!("Unsubscribed from {}", self.channel);
        outcome
    }

    /// Marks the subscription inactive after the connection was lost.
    /// Emits at most one unsubscribe event per active session.
    pub async fn send_unsubscribe_event_if_needed(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            if state.status == SubscriptionStatus::Unsubscribed {
                return;
            }
            state.reset()
        };
        if previous == SubscriptionStatus::Subscribed {
            self.emit_unsubscribe();
        }
    }

    fn emit_unsubscribe(&self) {
        self.events.unsubscribe.emit(UnsubscribeEvent {
            channel: self.channel.clone(),
        });
    }

    pub(crate) async fn add_publish(&self, publication: Publication) {
        self.state.lock().await.track(&publication);
        self.events.publish.emit(PublishEvent { publication });
    }

    pub(crate) fn add_join(&self, info: ClientInfo) {
        self.events.join.emit(JoinEvent { info });
    }

    pub(crate) fn add_leave(&self, info: ClientInfo) {
        self.events.leave.emit(LeaveEvent { info });
    }

    /// Server-side unsubscribe. Returns whether the subscription should be
    /// re-established right away.
    pub(crate) async fn add_unsubscribe(&self, resubscribe: bool) -> bool {
        let (previous, wants) = {
            let mut state = self.state.lock().await;
            let previous = state.reset();
            if !resubscribe {
                state.wants = false;
            }
            (previous, state.wants)
        };
        if previous == SubscriptionStatus::Subscribed {
            self.emit_unsubscribe();
        }
        resubscribe && wants
    }

    /// Publishes `data` into the channel.
    pub async fn publish(&self, data: Value) -> Result<()> {
        let request = PublishRequest {
            channel: self.channel.clone(),
            data,
        };
        self.client
            .request::<_, Value>(methods::PUBLISH, &request)
            .await
            .map(|_| ())
    }

    pub async fn history(&self) -> Result<Vec<Publication>> {
        let result: HistoryResult = self
            .client
            .request(methods::HISTORY, &self.channel_request())
            .await?;
        Ok(result.publications)
    }

    /// Clients currently subscribed to the channel, keyed by client id.
    pub async fn presence(&self) -> Result<HashMap<String, ClientInfo>> {
        let result: PresenceResult = self
            .client
            .request(methods::PRESENCE, &self.channel_request())
            .await?;
        Ok(result.presence)
    }

    pub async fn presence_stats(&self) -> Result<PresenceStatsResult> {
        self.client
            .request(methods::PRESENCE_STATS, &self.channel_request())
            .await
    }

    fn channel_request(&self) -> ChannelRequest {
        ChannelRequest {
            channel: self.channel.clone(),
        }
    }

    pub fn on_subscribe_success(&self) -> broadcast::Receiver<SubscribeSuccessEvent> {
        self.events.subscribe_success.subscribe()
    }

    pub fn on_subscribe_error(&self) -> broadcast::Receiver<SubscribeErrorEvent> {
        self.events.subscribe_error.subscribe()
    }

    pub fn on_unsubscribe(&self) -> broadcast::Receiver<UnsubscribeEvent> {
        self.events.unsubscribe.subscribe()
    }

    pub fn on_publish(&self) -> broadcast::Receiver<PublishEvent> {
        self.events.publish.subscribe()
    }

    pub fn on_join(&self) -> broadcast::Receiver<JoinEvent> {
        self.events.join.subscribe()
    }

    pub fn on_leave(&self) -> broadcast::Receiver<LeaveEvent> {
        self.events.leave.subscribe()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
