use std::future::Future;
use tokio::task::JoinHandle;

/// Tracks background tasks so they can be torn down together
pub struct TaskManager {
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Spawn a task and track it
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.prune();
        self.handles.push(tokio::spawn(future));
    }

    /// Track a task spawned elsewhere
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.prune();
        self.handles.push(handle);
    }

    /// Number of tasks still running
    pub fn active(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }

    fn prune(&mut self) {
        self.handles.retain(|h| !h.is_finished());
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
