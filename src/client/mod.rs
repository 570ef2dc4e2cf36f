// Module declarations
mod builder;
mod connection;
mod core;
mod handle;
mod recovery;
mod state;

// Public API exports
pub use self::core::CentrifugeClient;
pub use builder::{ClientBuilder, ClientConfig, PrivateSubCallback, PrivateSubEvent, RetryFn};
pub use connection::{ConnectionManager, ConnectionState};
pub use handle::ClientHandle;
pub use state::ClientState;
