use crate::types::constants::push_types;
use crate::types::protocol::{
    JoinPayload, LeavePayload, MessagePayload, PushEnvelope, SubscribePayload, UnsubscribePayload,
};
use crate::types::{CentrifugeError, ClientInfo, Publication, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A decoded server push.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Publication {
        channel: String,
        publication: Publication,
    },
    Join {
        channel: String,
        info: ClientInfo,
    },
    Leave {
        channel: String,
        info: ClientInfo,
    },
    Unsubscribe {
        channel: String,
        resubscribe: bool,
    },
    Message {
        data: Value,
    },
    Subscribe {
        channel: String,
        subscribe: SubscribePayload,
    },
}

fn payload<T: DeserializeOwned>(envelope: &PushEnvelope, kind: &str) -> Result<T> {
    // payload-less pushes (e.g. a bare unsubscribe) decode as an empty object
    let data = match &envelope.data {
        Value::Null => Value::Object(Default::default()),
        data => data.clone(),
    };
    serde_json::from_value(data).map_err(|e| {
        CentrifugeError::InvalidPush(format!(
            "{} payload on channel '{}': {}",
            kind, envelope.channel, e
        ))
    })
}

impl Push {
    /// Decodes the envelope payload according to its declared type.
    pub fn decode(envelope: PushEnvelope) -> Result<Self> {
        let push = match envelope.push_type {
            push_types::PUBLICATION => Self::Publication {
                publication: payload(&envelope, "publication")?,
                channel: envelope.channel,
            },
            push_types::JOIN => Self::Join {
                info: payload::<JoinPayload>(&envelope, "join")?.info,
                channel: envelope.channel,
            },
            push_types::LEAVE => Self::Leave {
                info: payload::<LeavePayload>(&envelope, "leave")?.info,
                channel: envelope.channel,
            },
            push_types::UNSUBSCRIBE => Self::Unsubscribe {
                resubscribe: payload::<UnsubscribePayload>(&envelope, "unsubscribe")?.resubscribe,
                channel: envelope.channel,
            },
            push_types::MESSAGE => Self::Message {
                data: payload::<MessagePayload>(&envelope, "message")?.data,
            },
            push_types::SUBSCRIBE => Self::Subscribe {
                subscribe: payload(&envelope, "subscribe")?,
                channel: envelope.channel,
            },
            other => {
                return Err(CentrifugeError::InvalidPush(format!(
                    "unknown push type {}",
                    other
                )));
            }
        };
        Ok(push)
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Publication { channel, .. }
            | Self::Join { channel, .. }
            | Self::Leave { channel, .. }
            | Self::Unsubscribe { channel, .. }
            | Self::Subscribe { channel, .. } => Some(channel.as_str()),
            Self::Message { .. } => None,
        }
    }
}
