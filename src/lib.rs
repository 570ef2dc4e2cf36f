//! # Centrifuge Client
//!
//! A Rust client for Centrifugo-compatible real-time servers (JSON protocol
//! over WebSocket).
//!
//! The client keeps a single connection alive with automatic reconnects,
//! restores server-side subscriptions from their last offset/epoch and
//! re-subscribes application subscriptions after every reconnect.
//!
//! ## Example
//!
//! ```no_run
//! use centrifuge_client::{CentrifugeClient, ClientConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CentrifugeClient::new(
//!         "ws://localhost:8000/connection/websocket?format=json",
//!         ClientConfig::default(),
//!     )?;
//!     client.connect().await;
//!
//!     let news = client.get_subscription("news").await;
//!     let mut publications = news.on_publish();
//!     news.subscribe().await?;
//!
//!     news.publish(json!({"text": "hello"})).await?;
//!     let event = publications.recv().await?;
//!     println!("received {}", event.publication.data);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod subscription;
pub mod transport;
pub mod types;

pub use client::{
    CentrifugeClient, ClientBuilder, ClientConfig, ConnectionState, PrivateSubCallback,
    PrivateSubEvent, RetryFn,
};
pub use infrastructure::{Backoff, HttpTokenProvider};
pub use messaging::{
    ConnectEvent, DisconnectEvent, EventHub, MessageEvent, ServerJoinEvent, ServerLeaveEvent,
    ServerPublishEvent, ServerSubscribeEvent, ServerUnsubscribeEvent,
};
pub use subscription::{
    JoinEvent, LeaveEvent, PublishEvent, ServerSubscription, SubscribeErrorEvent,
    SubscribeSuccessEvent, Subscription, SubscriptionStatus, UnsubscribeEvent,
};
pub use transport::{Transport, TransportEvent, TransportFactory, TransportOptions};
pub use types::{CentrifugeError, ClientInfo, Publication, Result};
