use super::ClientState;
use crate::messaging::{EventHub, ServerPublishEvent, ServerSubscribeEvent};
use crate::subscription::ServerSubscription;
use crate::types::Publication;
use crate::types::protocol::{SubscribeRecovery, SubscribeResult};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Recovery descriptors for every known server subscription.
pub(crate) fn recovery_descriptors(state: &ClientState) -> HashMap<String, SubscribeRecovery> {
    state
        .server_subscriptions
        .iter()
        .map(|(channel, sub)| (channel.clone(), sub.recovery()))
        .collect()
}

/// Applies the server subscriptions declared by a handshake result.
///
/// Declared channels are upserted and announced, followed by their replayed
/// publications in order. Known channels missing from `subs` are evicted
/// without an event.
pub(crate) async fn reconcile(
    state: &RwLock<ClientState>,
    events: &EventHub,
    subs: HashMap<String, SubscribeResult>,
) {
    let mut announcements: Vec<(ServerSubscribeEvent, Vec<Publication>)> = Vec::new();
    {
        let mut state = state.write().await;

        let stale: Vec<String> = state
            .server_subscriptions
            .keys()
            .filter(|channel| !subs.contains_key(*channel))
            .cloned()
            .collect();

        for (channel, result) in subs {
            let is_resubscribed = state.server_subscriptions.contains_key(&channel);
            let server_sub = ServerSubscription::from_result(channel.clone(), &result);
            announcements.push((server_sub.subscribe_event(is_resubscribed), result.publications));
            state.server_subscriptions.insert(channel, server_sub);
        }

        for channel in stale {
            tracing::info!("Server subscription {} not restored, evicting", channel);
            state.server_subscriptions.remove(&channel);
        }
    }

    for (event, publications) in announcements {
        let channel = event.channel.clone();
        events.server_subscribe.emit(event);
        for publication in publications {
            events.server_publish.emit(ServerPublishEvent {
                channel: channel.clone(),
                publication,
            });
        }
    }
}
