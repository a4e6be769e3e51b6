//! Fan-out of upload events to the views watching one form.
//!
//! Progress is only emitted when the displayed percentage rises, so one
//! upload produces at most about a hundred events (ticks, transport
//! progress, state changes, notifications). A capacity of 1000 lets a view
//! that drains late, such as the CLI printer after a burst, catch up on
//! several uploads. A subscriber that falls further behind gets
//! `RecvError::Lagged` and the orchestrator never waits on it.

use tokio::sync::broadcast;

use crate::models::{UploadEvent, UploadEventMessage};

const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Cloneable sender shared by the orchestrator, its ticker and its progress sink.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<UploadEventMessage>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receiver for every event sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEventMessage> {
        self.sender.subscribe()
    }

    /// Stamp and send `event`; returns how many views received it.
    pub fn send(&self, event: UploadEvent) -> usize {
        // Events sent before any view subscribes are dropped.
        self.sender.send(UploadEventMessage::new(event)).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
