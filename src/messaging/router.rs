use super::event::{
    EventHub, MessageEvent, ServerJoinEvent, ServerLeaveEvent, ServerPublishEvent,
    ServerUnsubscribeEvent,
};
use super::push::Push;
use crate::client::ClientState;
use crate::subscription::{ServerSubscription, Subscription};
use crate::types::protocol::PushEnvelope;
use crate::types::{ClientInfo, Publication};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Routes server pushes to client subscriptions or the global event streams.
///
/// A client subscription always wins over a server subscription for the
/// same channel; the global stream is not notified in that case.
pub struct PushRouter {
    state: Arc<RwLock<ClientState>>,
    events: Arc<EventHub>,
}

impl PushRouter {
    pub fn new_with_state(state: Arc<RwLock<ClientState>>, events: Arc<EventHub>) -> Self {
        Self { state, events }
    }

    /// Decodes and routes a raw push envelope. Malformed pushes are dropped.
    pub async fn route_envelope(&self, envelope: PushEnvelope) {
        match Push::decode(envelope) {
            Ok(push) => self.route(push).await,
            Err(e) => tracing::warn!("Dropping push: {}", e),
        }
    }

    pub async fn route(&self, push: Push) {
        tracing::debug!("Routing push: {:?}", push);
        match push {
            Push::Publication {
                channel,
                publication,
            } => self.handle_publication(channel, publication).await,
            Push::Join { channel, info } => self.handle_join(channel, info).await,
            Push::Leave { channel, info } => self.handle_leave(channel, info).await,
            Push::Unsubscribe {
                channel,
                resubscribe,
            } => self.handle_unsubscribe(channel, resubscribe).await,
            Push::Subscribe { channel, subscribe } => {
                let server_sub = ServerSubscription::from_push(channel.clone(), &subscribe);
                let event = server_sub.subscribe_event(false);
                self.state
                    .write()
                    .await
                    .server_subscriptions
                    .insert(channel, server_sub);
                self.events.server_subscribe.emit(event);
            }
            Push::Message { data } => self.events.message.emit(MessageEvent { data }),
        }
    }

    async fn client_subscription(&self, channel: &str) -> Option<Arc<Subscription>> {
        self.state.read().await.subscriptions.get(channel).cloned()
    }

    async fn has_server_subscription(&self, channel: &str) -> bool {
        self.state
            .read()
            .await
            .server_subscriptions
            .contains_key(channel)
    }

    async fn handle_publication(&self, channel: String, publication: Publication) {
        if let Some(sub) = self.client_subscription(&channel).await {
            sub.add_publish(publication).await;
            return;
        }

        {
            let mut state = self.state.write().await;
            let Some(server_sub) = state.server_subscriptions.get_mut(&channel) else {
                tracing::debug!("Publication for unknown channel {}", channel);
                return;
            };
            server_sub.advance(publication.offset);
        }
        self.events.server_publish.emit(ServerPublishEvent {
            channel,
            publication,
        });
    }

    async fn handle_join(&self, channel: String, info: ClientInfo) {
        if let Some(sub) = self.client_subscription(&channel).await {
            sub.add_join(info);
        } else if self.has_server_subscription(&channel).await {
            self.events
                .server_join
                .emit(ServerJoinEvent { channel, info });
        } else {
            tracing::debug!("Join for unknown channel {}", channel);
        }
    }

    async fn handle_leave(&self, channel: String, info: ClientInfo) {
        if let Some(sub) = self.client_subscription(&channel).await {
            sub.add_leave(info);
        } else if self.has_server_subscription(&channel).await {
            self.events
                .server_leave
                .emit(ServerLeaveEvent { channel, info });
        } else {
            tracing::debug!("Leave for unknown channel {}", channel);
        }
    }

    async fn handle_unsubscribe(&self, channel: String, resubscribe: bool) {
        if let Some(sub) = self.client_subscription(&channel).await {
            if sub.add_unsubscribe(resubscribe).await {
                tracing::info!("Server asked to resubscribe to {}", channel);
                tokio::spawn(async move { sub.resubscribe_if_needed().await });
            }
            return;
        }

        let removed = self
            .state
            .write()
            .await
            .server_subscriptions
            .remove(&channel);
        if removed.is_some() {
            tracing::info!("Server unsubscribed from {}", channel);
            self.events
                .server_unsubscribe
                .emit(ServerUnsubscribeEvent { channel });
        }
    }
}
