use super::handle::ClientHandle;
use super::recovery;
use super::{ClientBuilder, ClientConfig, ClientState, ConnectionManager, ConnectionState};
use crate::messaging::{
    ConnectEvent, DisconnectEvent, EventHub, PushRouter, ServerUnsubscribeEvent,
};
use crate::subscription::{ServerSubscription, Subscription};
use crate::transport::{TransportEvent, TransportFactory};
use crate::types::constants::{methods, reasons};
use crate::types::protocol::{ConnectRequest, ConnectResult, PublishRequest, RpcRequest, RpcResult};
use crate::types::{CentrifugeError, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};

enum ConnectOutcome {
    Connected,
    Failed,
    Skipped,
}

/// Why a handshake did not complete, and whether the server allows another try.
struct HandshakeFailure {
    reason: String,
    reconnect: bool,
}

impl From<CentrifugeError> for HandshakeFailure {
    fn from(error: CentrifugeError) -> Self {
        tracing::error!("Connect attempt failed: {}", error);
        Self {
            reason: reasons::CONNECT_FAILED.to_string(),
            reconnect: true,
        }
    }
}

impl HandshakeFailure {
    fn from_event(event: TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Push(_) => None,
            TransportEvent::Error(reason) => Some(Self {
                reason,
                reconnect: true,
            }),
            TransportEvent::Closed { reason, reconnect } => Some(Self { reason, reconnect }),
        }
    }
}

/// The main entry point for talking to a Centrifugo-compatible server.
///
/// `CentrifugeClient` owns the connection lifecycle: it performs the
/// handshake, reconnects with backoff after the transport drops, keeps
/// server-side subscriptions recoverable across reconnects and routes
/// pushes to subscriptions or to the global event streams.
///
/// # Example
///
/// ```no_run
/// use centrifuge_client::{CentrifugeClient, ClientConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CentrifugeClient::new(
///     "ws://localhost:8000/connection/websocket?format=json",
///     ClientConfig::default(),
/// )?;
///
/// let mut connected = client.events().on_connect();
/// client.connect().await;
/// let event = connected.recv().await?;
/// println!("connected as {}", event.client);
///
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CentrifugeClient {
    pub(crate) url: Arc<str>,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) transport: Arc<dyn TransportFactory>,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,

    // Consolidated mutable state
    pub(crate) state: Arc<RwLock<ClientState>>,

    pub(crate) events: Arc<EventHub>,

    // Serializes connect attempts, disconnect processing and push handling
    pub(crate) lifecycle: Arc<Mutex<()>>,
}

impl CentrifugeClient {
    /// Creates a client using the WebSocket transport.
    ///
    /// This does not connect. Call [`connect()`](Self::connect) to start.
    ///
    /// # Errors
    ///
    /// Returns [`CentrifugeError::UrlParse`] if `url` cannot be parsed.
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(url, config).map(|builder| builder.build())
    }

    fn handle(&self) -> ClientHandle {
        ClientHandle::new(&self.connection, &self.state, Arc::clone(&self.config))
    }

    /// Starts connecting.
    ///
    /// Returns once the first attempt finished. A failed attempt is not
    /// returned as an error: it is reported on the disconnect stream and
    /// retried in the background until [`disconnect()`](Self::disconnect).
    /// No-op unless the client is disconnected.
    pub async fn connect(&self) {
        if self.connection.state().await != ConnectionState::Disconnected {
            return;
        }
        self.state.write().await.was_manual_disconnect = false;
        self.try_connect(None).await;
    }

    /// Disconnects and stops reconnecting.
    ///
    /// Calling it again while disconnected has no effect.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.write().await;
            state.was_manual_disconnect = true;
            state.stop_reconnect_loop(true);
        }

        let _guard = self.lifecycle.lock().await;
        tracing::info!("Disconnecting from {}", self.url);
        self.process_disconnect(reasons::CLIENT, false).await;
        self.state.write().await.task_manager.abort_all();
    }

    /// One connect attempt. `retry_loop` identifies the reconnect loop
    /// driving it; `None` for an application-initiated connect.
    async fn try_connect(&self, retry_loop: Option<u64>) -> ConnectOutcome {
        let _guard = self.lifecycle.lock().await;

        {
            let state = self.state.read().await;
            if state.was_manual_disconnect {
                tracing::info!("Manual disconnect detected, will not attempt to connect");
                return ConnectOutcome::Skipped;
            }
            if retry_loop.is_some() && state.reconnect_loop != retry_loop {
                return ConnectOutcome::Skipped;
            }
        }

        let expected = match retry_loop {
            Some(_) => ConnectionState::Connecting,
            None => ConnectionState::Disconnected,
        };
        if self.connection.state().await != expected {
            return ConnectOutcome::Skipped;
        }

        self.connection.set_state(ConnectionState::Connecting).await;
        tracing::info!("Connecting to {}", self.url);

        match self.handshake().await {
            Ok(result) => {
                self.on_connected(result).await;
                ConnectOutcome::Connected
            }
            Err(failure) => {
                self.process_disconnect(&failure.reason, failure.reconnect).await;
                ConnectOutcome::Failed
            }
        }
    }

    /// Opens a transport and runs the CONNECT exchange on it.
    ///
    /// A close or error reported by the transport while the reply is pending
    /// decides the outcome, so a server refusing reconnects is honoured.
    async fn handshake(&self) -> std::result::Result<ConnectResult, HandshakeFailure> {
        let generation = self.connection.next_generation();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let options = self.config.transport_options();
        let transport = self
            .transport
            .open(&self.url, &options, events_tx.clone())
            .await?;
        self.connection
            .install(Arc::clone(&transport), events_tx)
            .await;

        let request = {
            let state = self.state.read().await;
            ConnectRequest {
                token: state.token.clone(),
                data: state.connect_data.clone(),
                name: self.config.name.clone(),
                version: self.config.version.clone(),
                subs: recovery::recovery_descriptors(&state),
            }
        };
        let params = serde_json::to_value(&request).map_err(CentrifugeError::from)?;

        // Pushes that arrive before the reply are routed once connected
        let mut backlog = Vec::new();
        let mut pending = transport.send(methods::CONNECT, params);
        let reply = loop {
            tokio::select! {
                reply = &mut pending => break reply,
                Some(event) = events_rx.recv() => {
                    if let Some(failure) = HandshakeFailure::from_event(event.clone()) {
                        return Err(failure);
                    }
                    backlog.push(event);
                }
            }
        };

        let result = match reply {
            Ok(value) => serde_json::from_value(value).map_err(CentrifugeError::from)?,
            Err(CentrifugeError::Closed) => {
                return Err(self.close_cause(&mut events_rx).await);
            }
            Err(e) => return Err(e.into()),
        };

        let pump = self.clone().run_event_pump(generation, backlog, events_rx);
        self.state.write().await.task_manager.spawn(pump);
        Ok(result)
    }

    /// Waits for the transport to report why it closed under a pending
    /// handshake.
    async fn close_cause(
        &self,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> HandshakeFailure {
        let cause = async {
            while let Some(event) = events.recv().await {
                if let Some(failure) = HandshakeFailure::from_event(event) {
                    return Some(failure);
                }
            }
            None
        };

        match tokio::time::timeout(self.config.timeout, cause).await {
            Ok(Some(failure)) => failure,
            _ => CentrifugeError::Closed.into(),
        }
    }

    async fn on_connected(&self, result: ConnectResult) {
        {
            let mut state = self.state.write().await;
            state.client_id = Some(result.client.clone());
            state.retry_count = 0;
            state.stop_reconnect_loop(false);
        }
        self.connection.set_state(ConnectionState::Connected).await;
        tracing::info!("Connected as {}", result.client);

        self.events.connect.emit(ConnectEvent {
            client: result.client,
            version: result.version,
            data: result.data,
        });

        recovery::reconcile(&self.state, &self.events, result.subs).await;

        let subscriptions = self.state.read().await.subscription_list();
        for sub in subscriptions {
            tokio::spawn(async move { sub.resubscribe_if_needed().await });
        }
    }

    /// Tears the current connection down and decides whether to reconnect.
    /// Callers hold the lifecycle lock.
    async fn process_disconnect(&self, reason: &str, reconnect: bool) {
        let previous = self.connection.state().await;
        if previous == ConnectionState::Disconnected {
            return;
        }

        // Events still queued for the old transport are dropped from here on
        self.connection.next_generation();

        let (subscriptions, server_channels) = {
            let mut state = self.state.write().await;
            state.client_id = None;
            let server_channels: Vec<String> =
                state.server_subscriptions.keys().cloned().collect();
            (state.subscription_list(), server_channels)
        };

        if let Some(transport) = self.connection.take_transport().await
            && tokio::time::timeout(self.config.timeout, transport.close())
                .await
                .is_err()
        {
            tracing::warn!("Timed out closing transport");
        }

        if previous == ConnectionState::Connected {
            for sub in subscriptions {
                sub.send_unsubscribe_event_if_needed().await;
            }
            for channel in server_channels {
                self.events
                    .server_unsubscribe
                    .emit(ServerUnsubscribeEvent { channel });
            }
        }

        let will_reconnect = {
            let mut state = self.state.write().await;
            let will_reconnect = reconnect && !state.was_manual_disconnect;
            if !will_reconnect {
                state.stop_reconnect_loop(false);
            } else if state.reconnect_loop.is_none() {
                let id = state.start_reconnect_loop();
                state.reconnect_task = Some(tokio::spawn(self.clone().reconnect_loop(id)));
            }
            will_reconnect
        };

        if will_reconnect {
            self.connection.set_state(ConnectionState::Connecting).await;
            tracing::warn!("Disconnected ({}), reconnecting", reason);
        } else {
            self.connection.set_state(ConnectionState::Disconnected).await;
            tracing::info!("Disconnected ({})", reason);
        }

        self.events.disconnect.emit(DisconnectEvent {
            reason: reason.to_string(),
            reconnect: will_reconnect,
        });
    }

    fn reconnect_loop(self, id: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            loop {
                let attempt = {
                    let mut state = self.state.write().await;
                    if state.was_manual_disconnect || state.reconnect_loop != Some(id) {
                        tracing::info!("Reconnect loop {} stopped", id);
                        return;
                    }
                    state.retry_count += 1;
                    state.retry_count
                };

                let delay = (self.config.retry)(attempt);
                tracing::info!("Reconnect attempt {} in {:?}", attempt, delay);
                tokio::time::sleep(delay).await;

                match self.try_connect(Some(id)).await {
                    ConnectOutcome::Failed => continue,
                    ConnectOutcome::Connected | ConnectOutcome::Skipped => return,
                }
            }
        })
    }

    fn run_event_pump(
        self,
        generation: u64,
        backlog: Vec<TransportEvent>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let router =
                PushRouter::new_with_state(Arc::clone(&self.state), Arc::clone(&self.events));
            let mut backlog = backlog.into_iter();

            loop {
                let event = match backlog.next() {
                    Some(event) => event,
                    None => match events.recv().await {
                        Some(event) => event,
                        None => break,
                    },
                };
                let _guard = self.lifecycle.lock().await;
                if self.connection.generation() != generation {
                    tracing::debug!("Dropping event of replaced transport");
                    break;
                }

                match event {
                    TransportEvent::Push(envelope) => router.route_envelope(envelope).await,
                    TransportEvent::Error(error) => {
                        tracing::error!("Transport error: {}", error);
                        self.process_disconnect(&error, true).await;
                        break;
                    }
                    TransportEvent::Closed { reason, reconnect } => {
                        self.process_disconnect(&reason, reconnect).await;
                        break;
                    }
                }
            }
        })
    }

    /// Publishes `data` into `channel`.
    ///
    /// # Errors
    ///
    /// Fails with [`CentrifugeError::NotConnected`] while not connected, or
    /// with the server's error reply.
    pub async fn publish(&self, channel: &str, data: Value) -> Result<()> {
        let request = PublishRequest {
            channel: channel.to_string(),
            data,
        };
        self.connection
            .request::<_, Value>(methods::PUBLISH, &request)
            .await
            .map(|_| ())
    }

    /// Sends an RPC and returns the server's result payload.
    pub async fn rpc(&self, data: Value) -> Result<Value> {
        let result: RpcResult = self
            .connection
            .request(methods::RPC, &RpcRequest { data })
            .await?;
        Ok(result.data)
    }

    /// Asynchronous one-way messages are not supported by this client.
    pub async fn send(&self, _data: Value) -> Result<()> {
        Err(CentrifugeError::Unsupported("send"))
    }

    /// Returns the subscription for `channel`, creating it on first use.
    ///
    /// The subscription is not subscribed yet; call
    /// [`Subscription::subscribe`] on it.
    pub async fn get_subscription(&self, channel: &str) -> Arc<Subscription> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.subscriptions.get(channel) {
            return Arc::clone(existing);
        }

        tracing::debug!("Creating subscription for {}", channel);
        let sub = Arc::new(Subscription::new(channel, self.handle()));
        state
            .subscriptions
            .insert(channel.to_string(), Arc::clone(&sub));
        sub
    }

    /// Unsubscribes `subscription` and forgets it. A later
    /// [`get_subscription`](Self::get_subscription) creates a fresh one.
    pub async fn remove_subscription(&self, subscription: &Arc<Subscription>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let registered = state
                .subscriptions
                .get(subscription.channel())
                .is_some_and(|existing| Arc::ptr_eq(existing, subscription));
            if registered {
                state.subscriptions.remove(subscription.channel());
            }
        }
        subscription.unsubscribe().await
    }

    pub async fn has_subscription(&self, channel: &str) -> bool {
        self.state.read().await.subscriptions.contains_key(channel)
    }

    /// Sets the token sent with the next handshake. `None` clears it.
    pub async fn set_token(&self, token: Option<String>) {
        self.state.write().await.token = token;
    }

    /// Sets the data sent with the next handshake. `None` clears it.
    pub async fn set_connect_data(&self, data: Option<Value>) {
        self.state.write().await.connect_data = data;
    }

    /// Resolves the subscription token for a private channel through the
    /// configured callback. `None` for public channels or while no client id
    /// is known.
    pub async fn private_token(&self, channel: &str) -> Result<Option<String>> {
        self.handle().private_token(channel).await
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Identity issued by the server; `None` while not connected.
    pub async fn client_id(&self) -> Option<String> {
        self.state.read().await.client_id.clone()
    }

    pub async fn retry_count(&self) -> u32 {
        self.state.read().await.retry_count
    }

    /// Snapshot of the server-side subscriptions and their recovery positions.
    pub async fn server_subscriptions(&self) -> HashMap<String, ServerSubscription> {
        self.state.read().await.server_subscriptions.clone()
    }

    /// Client-level event streams.
    pub fn events(&self) -> &EventHub {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PrivateSubEvent;
    use crate::messaging::MessageEvent;
    use crate::transport::mock::MockTransportFactory;
    use crate::types::constants::push_types;
    use crate::types::protocol::SubscribeRecovery;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn fast_retry() -> ClientConfig {
        ClientConfig {
            retry: Arc::new(|_attempt: u32| Duration::from_millis(1)),
            ..Default::default()
        }
    }

    fn client_with(mock: &MockTransportFactory, config: ClientConfig) -> CentrifugeClient {
        ClientBuilder::new("ws://localhost:8000/connection/websocket", config)
            .unwrap()
            .with_transport(Arc::new(mock.clone()))
            .build()
    }

    async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    /// Pushes a marker message and waits for it, so every push sent before
    /// has been routed.
    async fn settle(mock: &MockTransportFactory, messages: &mut broadcast::Receiver<MessageEvent>) {
        mock.push(push_types::MESSAGE, "", json!({"data": "marker"}));
        loop {
            if next(messages).await.data == json!("marker") {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_connect_sets_identity_and_emits_event() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();

        client.connect().await;

        assert_eq!(client.state().await, ConnectionState::Connected);
        assert_eq!(client.client_id().await.as_deref(), Some("client-1"));
        assert_eq!(next(&mut connects).await.client, "client-1");

        let requests = mock.connect_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "rust");
        assert!(requests[0].subs.is_empty());
    }

    #[tokio::test]
    async fn test_retry_count_increments_per_attempt_and_resets() {
        let mock = MockTransportFactory::new();
        mock.fail_next_opens(2);

        let attempts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&attempts);
        let config = ClientConfig {
            retry: Arc::new(move |attempt: u32| {
                recorded.lock().unwrap().push(attempt);
                Duration::from_millis(1)
            }),
            ..Default::default()
        };
        let client = client_with(&mock, config);
        let mut connects = client.events().on_connect();
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        next(&mut connects).await;

        assert_eq!(mock.opens(), 3);
        assert_eq!(client.retry_count().await, 0);
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
        for _ in 0..2 {
            let event = next(&mut disconnects).await;
            assert_eq!(event.reason, reasons::CONNECT_FAILED);
            assert!(event.reconnect);
        }

        mock.drop_connection("transport closed");
        next(&mut connects).await;
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2, 1]);
        assert_eq!(client.retry_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_backoff_cancels_reconnect() {
        let mock = MockTransportFactory::new();
        let config = ClientConfig {
            retry: Arc::new(|_attempt: u32| Duration::from_millis(50)),
            ..Default::default()
        };
        let client = client_with(&mock, config);
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        mock.drop_connection("transport closed");

        let event = next(&mut disconnects).await;
        assert!(event.reconnect);
        assert_eq!(client.state().await, ConnectionState::Connecting);

        client.disconnect().await;
        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, reasons::CLIENT);
        assert!(!event.reconnect);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(mock.opens(), 1);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_handshake_carries_recovery_descriptors() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({
            "subs": {"news": {"recoverable": true, "offset": 5, "epoch": "e1"}}
        }));
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();

        client.connect().await;
        next(&mut connects).await;
        mock.drop_connection("transport closed");
        next(&mut connects).await;

        let requests = mock.connect_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].subs["news"],
            SubscribeRecovery {
                recover: true,
                offset: 5,
                epoch: "e1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_reconnect_evicts_server_subscriptions_not_restored() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({"subs": {"news": {}, "sports": {}}}));
        mock.script_connect(json!({"subs": {"news": {}}}));
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();
        let mut unsubscribes = client.events().on_server_unsubscribe();
        let mut publications = client.events().on_server_publish();
        let mut messages = client.events().on_message();

        client.connect().await;
        assert_eq!(client.server_subscriptions().await.len(), 2);

        mock.drop_connection("transport closed");
        let lost: HashSet<String> = [next(&mut unsubscribes).await, next(&mut unsubscribes).await]
            .into_iter()
            .map(|event| event.channel)
            .collect();
        assert_eq!(lost, HashSet::from(["news".to_string(), "sports".to_string()]));

        next(&mut connects).await;
        next(&mut connects).await;
        settle(&mock, &mut messages).await;

        let subs = client.server_subscriptions().await;
        assert!(subs.contains_key("news"));
        assert!(!subs.contains_key("sports"));

        mock.push(push_types::PUBLICATION, "sports", json!({"data": "late"}));
        settle(&mock, &mut messages).await;
        assert!(publications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_subscription_wins_over_server_subscription() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({"subs": {"news": {}}}));
        let client = client_with(&mock, fast_retry());
        let mut server_publications = client.events().on_server_publish();
        let mut messages = client.events().on_message();

        client.connect().await;
        let sub = client.get_subscription("news").await;
        let mut publications = sub.on_publish();

        mock.push(
            push_types::PUBLICATION,
            "news",
            json!({"data": {"n": 1}, "offset": 6}),
        );
        settle(&mock, &mut messages).await;

        assert_eq!(next(&mut publications).await.publication.data, json!({"n": 1}));
        assert!(server_publications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_publication_advances_recovery_offset() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({
            "subs": {"news": {"recoverable": true, "offset": 1, "epoch": "e"}}
        }));
        let client = client_with(&mock, fast_retry());
        let mut publications = client.events().on_server_publish();

        client.connect().await;
        mock.push(push_types::PUBLICATION, "news", json!({"data": 1, "offset": 2}));

        let event = next(&mut publications).await;
        assert_eq!(event.channel, "news");
        assert_eq!(client.server_subscriptions().await["news"].offset, 2);
    }

    #[tokio::test]
    async fn test_subscribe_push_creates_server_subscription() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut announced = client.events().on_server_subscribe();

        client.connect().await;
        mock.push(
            push_types::SUBSCRIBE,
            "alerts",
            json!({"recoverable": true, "offset": 3, "epoch": "x"}),
        );

        let event = next(&mut announced).await;
        assert_eq!(event.channel, "alerts");
        assert!(!event.is_resubscribed);
        assert_eq!(client.server_subscriptions().await["alerts"].offset, 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_push_evicts_server_subscription() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({"subs": {"news": {}}}));
        let client = client_with(&mock, fast_retry());
        let mut unsubscribes = client.events().on_server_unsubscribe();

        client.connect().await;
        mock.push(push_types::UNSUBSCRIBE, "news", json!({}));

        assert_eq!(next(&mut unsubscribes).await.channel, "news");
        assert!(client.server_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_join_and_leave_reach_global_streams() {
        let mock = MockTransportFactory::new();
        mock.script_connect(json!({"subs": {"chat": {}}}));
        let client = client_with(&mock, fast_retry());
        let mut joins = client.events().on_server_join();
        let mut leaves = client.events().on_server_leave();

        client.connect().await;
        mock.push(push_types::JOIN, "chat", json!({"info": {"user": "u1", "client": "c1"}}));
        mock.push(push_types::LEAVE, "chat", json!({"info": {"user": "u1", "client": "c1"}}));

        assert_eq!(next(&mut joins).await.info.user, "u1");
        assert_eq!(next(&mut leaves).await.info.client, "c1");
    }

    #[tokio::test]
    async fn test_message_push_reaches_message_stream() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut messages = client.events().on_message();

        client.connect().await;
        mock.push(push_types::MESSAGE, "", json!({"data": {"hello": "world"}}));

        assert_eq!(next(&mut messages).await.data, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn test_get_subscription_is_idempotent() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());

        let first = client.get_subscription("news").await;
        let second = client.get_subscription("news").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(client.has_subscription("news").await);

        client.remove_subscription(&first).await.unwrap();
        assert!(!client.has_subscription("news").await);

        let third = client.get_subscription("news").await;
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        client.disconnect().await;
        client.disconnect().await;

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, reasons::CLIENT);
        assert!(!event.reconnect);
        assert!(disconnects.try_recv().is_err());

        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.client_id().await, None);
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test]
    async fn test_server_close_without_reconnect_stays_disconnected() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        mock.close_connection("invalid token", false);

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, "invalid token");
        assert!(!event.reconnect);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mock.opens(), 1);
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        client.connect().await;
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_retried() {
        let mock = MockTransportFactory::new();
        mock.reject_next_connect(3501, "bad request");
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;

        assert_eq!(next(&mut disconnects).await.reason, reasons::CONNECT_FAILED);
        next(&mut connects).await;
        assert_eq!(mock.opens(), 2);
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_without_reconnect_during_handshake_stops() {
        let mock = MockTransportFactory::new();
        mock.close_during_next_connect("invalid token", false);
        let client = client_with(&mock, fast_retry());
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, "invalid token");
        assert!(!event.reconnect);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.opens(), 1);
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(client.client_id().await.is_none());
    }

    #[tokio::test]
    async fn test_close_with_reconnect_during_handshake_retries() {
        let mock = MockTransportFactory::new();
        mock.close_during_next_connect("shutdown", true);
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, "shutdown");
        assert!(event.reconnect);
        assert_eq!(next(&mut connects).await.client, "client-2");
        assert_eq!(mock.opens(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_always_reconnects() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        next(&mut connects).await;

        mock.error("connection reset");

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, "connection reset");
        assert!(event.reconnect);
        assert_eq!(next(&mut connects).await.client, "client-2");
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_transport_failure_aborts_connection() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();
        let mut disconnects = client.events().on_disconnect();

        client.connect().await;
        next(&mut connects).await;

        let sub = client.get_subscription("news").await;
        let mut errors = sub.on_subscribe_error();
        let mut subscribed = sub.on_subscribe_success();
        mock.fail_next(methods::SUBSCRIBE, CentrifugeError::Timeout);

        assert!(matches!(
            sub.subscribe().await,
            Err(CentrifugeError::Timeout)
        ));
        assert_eq!(
            next(&mut errors).await.message,
            CentrifugeError::Timeout.to_string()
        );

        let event = next(&mut disconnects).await;
        assert_eq!(event.reason, reasons::SUBSCRIBE_FAILED);
        assert!(event.reconnect);
        next(&mut connects).await;

        // Still wanted, so it goes out again on the new connection
        next(&mut subscribed).await;
        assert!(sub.is_subscribed().await);
        assert_eq!(mock.opens(), 2);
        assert_eq!(mock.commands(methods::SUBSCRIBE).len(), 2);
    }

    #[tokio::test]
    async fn test_commands_and_unsupported_send() {
        let mock = MockTransportFactory::new();
        mock.reply_with(methods::RPC, json!({"data": {"answer": 42}}));
        let client = client_with(&mock, fast_retry());

        assert!(matches!(
            client.publish("news", json!(1)).await,
            Err(CentrifugeError::NotConnected)
        ));

        client.connect().await;
        client.publish("news", json!({"text": "hi"})).await.unwrap();
        assert_eq!(client.rpc(json!({"q": 1})).await.unwrap(), json!({"answer": 42}));
        assert_eq!(mock.commands(methods::RPC), vec![json!({"data": {"q": 1}})]);

        mock.reject(methods::PUBLISH, 103, "permission denied");
        assert!(matches!(
            client.publish("news", json!(2)).await,
            Err(CentrifugeError::Server { code: 103, .. })
        ));
        assert!(client.is_connected().await);

        assert!(matches!(
            client.send(json!("x")).await,
            Err(CentrifugeError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_private_subscription_carries_token() {
        let mock = MockTransportFactory::new();
        let config = fast_retry().with_private_subscribe(Arc::new(
            |event: PrivateSubEvent| -> BoxFuture<'static, Result<String>> {
                Box::pin(async move { Ok(format!("token-{}-{}", event.client, event.channel)) })
            },
        ));
        let client = client_with(&mock, config);

        assert_eq!(client.private_token("$secret").await.unwrap(), None);

        client.connect().await;
        assert_eq!(client.private_token("news").await.unwrap(), None);

        let sub = client.get_subscription("$secret").await;
        sub.subscribe().await.unwrap();

        assert_eq!(
            mock.commands(methods::SUBSCRIBE),
            vec![json!({"channel": "$secret", "token": "token-client-1-$secret"})]
        );
    }

    #[tokio::test]
    async fn test_subscriptions_resubscribe_after_reconnect() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());

        let sub = client.get_subscription("news").await;
        let mut successes = sub.on_subscribe_success();
        let mut unsubscribes = sub.on_unsubscribe();

        sub.subscribe().await.unwrap();
        assert!(mock.commands(methods::SUBSCRIBE).is_empty());

        client.connect().await;
        assert!(!next(&mut successes).await.is_resubscribed);

        mock.drop_connection("transport closed");
        assert_eq!(next(&mut unsubscribes).await.channel, "news");
        assert!(next(&mut successes).await.is_resubscribed);

        assert_eq!(mock.commands(methods::SUBSCRIBE).len(), 2);
        assert!(unsubscribes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_unsubscribe_with_resubscribe() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        client.connect().await;

        let sub = client.get_subscription("news").await;
        let mut successes = sub.on_subscribe_success();
        sub.subscribe().await.unwrap();
        next(&mut successes).await;

        mock.push(push_types::UNSUBSCRIBE, "news", json!({"resubscribe": true}));
        assert!(next(&mut successes).await.is_resubscribed);
        assert!(client.has_subscription("news").await);
    }

    #[tokio::test]
    async fn test_token_and_data_apply_to_next_handshake() {
        let mock = MockTransportFactory::new();
        let client = client_with(&mock, fast_retry());
        let mut connects = client.events().on_connect();

        client.set_token(Some("jwt".to_string())).await;
        client.set_connect_data(Some(json!({"lang": "en"}))).await;
        client.connect().await;
        next(&mut connects).await;

        client.set_token(None).await;
        mock.drop_connection("transport closed");
        next(&mut connects).await;

        let requests = mock.connect_requests();
        assert_eq!(requests[0].token.as_deref(), Some("jwt"));
        assert_eq!(requests[0].data, Some(json!({"lang": "en"})));
        assert_eq!(requests[1].token, None);
        assert_eq!(requests[1].data, Some(json!({"lang": "en"})));
    }
}
