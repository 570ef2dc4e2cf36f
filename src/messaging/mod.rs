// Messaging module - Event streams and push routing
pub mod event;
pub mod push;
pub mod router;

pub use event::{
    Broadcaster, ConnectEvent, DisconnectEvent, EventHub, MessageEvent, ServerJoinEvent,
    ServerLeaveEvent, ServerPublishEvent, ServerSubscribeEvent, ServerUnsubscribeEvent,
};
pub use push::Push;
pub use router::PushRouter;
