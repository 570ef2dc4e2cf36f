use centrifuge_client::{CentrifugeClient, ClientConfig, HttpTokenProvider};
use serde_json::json;
use std::time::Duration;

/// Connects to a Centrifugo server, subscribes to a channel and publishes into it.
///
/// Reads `CENTRIFUGO_URL`, optional `CENTRIFUGO_TOKEN` and optional
/// `CENTRIFUGO_TOKEN_ENDPOINT` (for `$`-prefixed channels) from `.env`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing to see logs
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let url = std::env::var("CENTRIFUGO_URL")
        .unwrap_or_else(|_| "ws://localhost:8000/connection/websocket?format=json".to_string());
    let channel = std::env::var("CENTRIFUGO_CHANNEL").unwrap_or_else(|_| "news".to_string());

    let mut config = ClientConfig {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    };
    if let Ok(endpoint) = std::env::var("CENTRIFUGO_TOKEN_ENDPOINT") {
        config = config.with_private_subscribe(HttpTokenProvider::new(endpoint).into_callback());
    }

    let client = CentrifugeClient::new(&url, config)?;
    if let Ok(token) = std::env::var("CENTRIFUGO_TOKEN") {
        client.set_token(Some(token)).await;
    }

    let mut disconnects = client.events().on_disconnect();
    tokio::spawn(async move {
        while let Ok(event) = disconnects.recv().await {
            println!("Disconnected: {} (reconnect: {})", event.reason, event.reconnect);
        }
    });

    println!("Connecting to: {}", url);
    let mut connects = client.events().on_connect();
    client.connect().await;
    let connected = tokio::time::timeout(Duration::from_secs(10), connects.recv()).await??;
    println!("Connected as {}", connected.client);

    let sub = client.get_subscription(&channel).await;
    let mut publications = sub.on_publish();
    let mut errors = sub.on_subscribe_error();
    tokio::spawn(async move {
        while let Ok(event) = errors.recv().await {
            println!("Subscribe error {}: {}", event.code, event.message);
        }
    });
    sub.subscribe().await?;
    println!("Subscribed to {}", channel);

    sub.publish(json!({"text": "hello from rust"})).await?;

    tokio::select! {
        event = publications.recv() => println!("Publication: {}", event?.publication.data),
        _ = tokio::signal::ctrl_c() => println!("Interrupted"),
    }

    client.remove_subscription(&sub).await?;
    client.disconnect().await;
    println!("Disconnected!");

    Ok(())
}
