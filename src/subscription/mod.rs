// Subscription module - client and server-side channel subscriptions
mod core;
mod server;
mod state;

pub use self::core::{
    JoinEvent, LeaveEvent, PublishEvent, SubscribeErrorEvent, SubscribeSuccessEvent, Subscription,
    UnsubscribeEvent,
};
pub use server::ServerSubscription;
pub use state::SubscriptionStatus;
