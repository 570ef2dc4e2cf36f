use crate::client::{PrivateSubCallback, PrivateSubEvent};
use crate::types::{CentrifugeError, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client: &'a str,
    channels: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ChannelToken {
    channel: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    channels: Vec<ChannelToken>,
}

/// Fetches private channel tokens from an application backend over HTTP.
///
/// POSTs `{"client": ..., "channels": [channel]}` and expects
/// `{"channels": [{"channel": ..., "token": ...}]}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    endpoint: String,
    headers: Vec<(String, String)>,
    http_client: reqwest::Client,
}

impl HttpTokenProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Adds a header sent with every token request (e.g. a session cookie).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub async fn token(&self, event: &PrivateSubEvent) -> Result<String> {
        let body = TokenRequest {
            client: &event.client,
            channels: [&event.channel],
        };

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CentrifugeError::Token(format!(
                "token request for channel '{}' failed with status: {}",
                event.channel,
                response.status()
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        select_token(parsed, &event.channel)
    }

    /// Wraps the provider as a `on_private_subscribe` callback.
    pub fn into_callback(self) -> PrivateSubCallback {
        let provider = Arc::new(self);
        Arc::new(move |event: PrivateSubEvent| -> BoxFuture<'static, Result<String>> {
            let provider = Arc::clone(&provider);
            Box::pin(async move { provider.token(&event).await })
        })
    }
}

fn select_token(response: TokenResponse, channel: &str) -> Result<String> {
    response
        .channels
        .into_iter()
        .find(|entry| entry.channel == channel)
        .map(|entry| entry.token)
        .ok_or_else(|| CentrifugeError::Token(format!("no token returned for channel '{}'", channel)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let body = TokenRequest {
            client: "abc",
            channels: ["$secret"],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"client": "abc", "channels": ["$secret"]})
        );
    }

    #[test]
    fn test_select_token_matches_channel() {
        let response: TokenResponse = serde_json::from_value(json!({
            "channels": [
                {"channel": "$other", "token": "t1"},
                {"channel": "$secret", "token": "t2"}
            ]
        }))
        .unwrap();
        assert_eq!(select_token(response, "$secret").unwrap(), "t2");
    }

    #[test]
    fn test_select_token_missing_channel() {
        let response: TokenResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            select_token(response, "$secret"),
            Err(CentrifugeError::Token(_))
        ));
    }
}
