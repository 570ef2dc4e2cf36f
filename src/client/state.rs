use crate::infrastructure::TaskManager;
use crate::subscription::{ServerSubscription, Subscription};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Consolidated mutable state for CentrifugeClient
/// Using a single struct reduces lock contention
pub struct ClientState {
    /// Identity issued by the server; cleared on every disconnect
    pub client_id: Option<String>,

    /// Reconnect attempts since the last successful connect
    pub retry_count: u32,

    /// Consumed by the next handshake
    pub token: Option<String>,
    pub connect_data: Option<Value>,

    /// Application-declared subscriptions
    pub subscriptions: HashMap<String, Arc<Subscription>>,

    /// Subscriptions imposed by the server, with their recovery position
    pub server_subscriptions: HashMap<String, ServerSubscription>,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    /// Id of the reconnect loop allowed to run, if any
    pub reconnect_loop: Option<u64>,
    pub reconnect_loops: u64,
    pub reconnect_task: Option<JoinHandle<()>>,

    /// Background task manager
    pub task_manager: TaskManager,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            client_id: None,
            retry_count: 0,
            token: None,
            connect_data: None,
            subscriptions: HashMap::new(),
            server_subscriptions: HashMap::new(),
            was_manual_disconnect: false,
            reconnect_loop: None,
            reconnect_loops: 0,
            reconnect_task: None,
            task_manager: TaskManager::new(),
        }
    }

    /// Registers a new reconnect loop, superseding any previous one.
    pub fn start_reconnect_loop(&mut self) -> u64 {
        self.reconnect_loops += 1;
        self.reconnect_loop = Some(self.reconnect_loops);
        self.reconnect_loops
    }

    /// Stops the current reconnect loop. The task is aborted only when
    /// `abort` is set; otherwise it exits at its next check.
    pub fn stop_reconnect_loop(&mut self, abort: bool) {
        self.reconnect_loop = None;
        if let Some(task) = self.reconnect_task.take()
            && abort
        {
            task.abort();
        }
    }

    /// Snapshot of the client subscriptions.
    pub fn subscription_list(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.values().cloned().collect()
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
