// Infrastructure module - background services and utilities
pub mod backoff;
pub mod heartbeat;
pub mod http;
pub mod task_manager;

pub use backoff::Backoff;
pub use heartbeat::HeartbeatManager;
pub use http::HttpTokenProvider;
pub use task_manager::TaskManager;
