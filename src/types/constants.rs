/// Command method codes (JSON protocol, integer encoded)
pub mod methods {
    pub const CONNECT: u8 = 0;
    pub const SUBSCRIBE: u8 = 1;
    pub const UNSUBSCRIBE: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PRESENCE: u8 = 4;
    pub const PRESENCE_STATS: u8 = 5;
    pub const HISTORY: u8 = 6;
    pub const PING: u8 = 7;
    pub const SEND: u8 = 8;
    pub const RPC: u8 = 9;
}

/// Push type codes
pub mod push_types {
    pub const PUBLICATION: u8 = 0;
    pub const JOIN: u8 = 1;
    pub const LEAVE: u8 = 2;
    pub const UNSUBSCRIBE: u8 = 3;
    pub const MESSAGE: u8 = 4;
    pub const SUBSCRIBE: u8 = 5;
}

/// Default client name sent in the handshake
pub const DEFAULT_NAME: &str = "rust";

/// Default private channel prefix
pub const DEFAULT_PRIVATE_CHANNEL_PREFIX: &str = "$";

/// Default request timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10000;

/// Default ping interval (milliseconds)
pub const PING_INTERVAL: u64 = 25000;

/// Default reconnect intervals (milliseconds)
pub const RECONNECT_INTERVALS: [u64; 4] = [1000, 2000, 5000, 10000];
pub const DEFAULT_RECONNECT_FALLBACK: u64 = 10000;

/// Capacity of each broadcast event stream
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;

/// Disconnect reasons produced by the client itself
pub mod reasons {
    pub const CLIENT: &str = "client";
    pub const CONNECT_FAILED: &str = "connect failed";
    pub const NO_PING: &str = "no ping";
    pub const SUBSCRIBE_FAILED: &str = "subscribe failed";
}
