//! JSON wire shapes for commands, replies and push payloads.

use super::error::{CentrifugeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A client-to-server command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub id: u32,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub method: u8,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl Command {
    pub fn new(id: u32, method: u8, params: Value) -> Self {
        Self { id, method, params }
    }
}

/// Error body attached to a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReply {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

/// A server-to-client frame: either the answer to a command (non-zero id)
/// or an asynchronous push (id absent or zero).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    #[serde(default)]
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl Reply {
    pub fn is_push(&self) -> bool {
        self.id == 0
    }

    /// Converts the reply into the command outcome.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(CentrifugeError::Server {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Splits a text frame into replies. Frames may batch several
/// newline-delimited replies.
pub fn decode_replies(text: &str) -> Vec<Result<Reply>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Reply>(line).map_err(CentrifugeError::from))
        .collect()
}

/// Raw push envelope. The payload is decoded per type by the router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "is_zero_u8")]
    pub push_type: u8,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

/// Information about a connected client, attached to publications and
/// presence events.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientInfo {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_info: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chan_info: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub offset: u64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ClientInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinPayload {
    pub info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeavePayload {
    pub info: ClientInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnsubscribePayload {
    #[serde(default)]
    pub resubscribe: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    #[serde(default)]
    pub data: Value,
}

/// Server-side subscription announcement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscribePayload {
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub epoch: String,
}

/// Recovery descriptor sent for a known server subscription in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRecovery {
    pub recover: bool,
    pub offset: u64,
    pub epoch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub subs: HashMap<String, SubscribeRecovery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectResult {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub expires: bool,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub subs: HashMap<String, SubscribeResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub recover: bool,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub epoch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubscribeResult {
    #[serde(default)]
    pub expires: bool,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default)]
    pub epoch: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub publications: Vec<Publication>,
    #[serde(default)]
    pub recovered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelRequest {
    pub channel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishRequest {
    pub channel: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub data: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RpcResult {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryResult {
    #[serde(default)]
    pub publications: Vec<Publication>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresenceResult {
    #[serde(default)]
    pub presence: HashMap<String, ClientInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PresenceStatsResult {
    #[serde(default)]
    pub num_clients: u32,
    #[serde(default)]
    pub num_users: u32,
}
