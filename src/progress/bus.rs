//! In-process fan-out of delivered pull events.

use tokio::sync::broadcast;

use crate::progress::event::{ProgressEvent, PullUpdate};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct PullBus {
    sender: broadcast::Sender<PullUpdate>,
}

impl PullBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PullUpdate> {
        self.sender.subscribe()
    }

    /// Publish an update. Having no subscribers is not an error.
    pub fn emit(&self, key: impl Into<String>, session_id: u64, event: ProgressEvent) -> usize {
        self.sender
            .send(PullUpdate::with_now(key, session_id, event))
            .unwrap_or(0)
    }
}

impl Default for PullBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
