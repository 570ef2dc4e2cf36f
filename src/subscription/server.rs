use crate::messaging::ServerSubscribeEvent;
use crate::types::protocol::{SubscribePayload, SubscribeRecovery, SubscribeResult};

/// Recovery record of a channel the server subscribed this client to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSubscription {
    pub channel: String,
    pub recoverable: bool,
    pub offset: u64,
    pub epoch: String,
}

impl ServerSubscription {
    pub fn from_result(channel: impl Into<String>, result: &SubscribeResult) -> Self {
        Self {
            channel: channel.into(),
            recoverable: result.recoverable,
            offset: result.offset,
            epoch: result.epoch.clone(),
        }
    }

    pub fn from_push(channel: impl Into<String>, payload: &SubscribePayload) -> Self {
        Self {
            channel: channel.into(),
            recoverable: payload.recoverable,
            offset: payload.offset,
            epoch: payload.epoch.clone(),
        }
    }

    /// Descriptor sent for this channel in the next handshake.
    pub fn recovery(&self) -> SubscribeRecovery {
        SubscribeRecovery {
            recover: self.recoverable,
            offset: self.offset,
            epoch: self.epoch.clone(),
        }
    }

    /// Moves the stream position forward after a delivered publication.
    pub fn advance(&mut self, offset: u64) {
        if self.recoverable && offset > self.offset {
            self.offset = offset;
        }
    }

    pub fn subscribe_event(&self, is_resubscribed: bool) -> ServerSubscribeEvent {
        ServerSubscribeEvent {
            channel: self.channel.clone(),
            recoverable: self.recoverable,
            offset: self.offset,
            epoch: self.epoch.clone(),
            is_resubscribed,
        }
    }
}
