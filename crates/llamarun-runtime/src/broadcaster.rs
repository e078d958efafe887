//! Runner event broadcasting.
//!
//! Fans lifecycle events out to any number of subscribers (the CLI's log
//! task, control surfaces). The broadcaster is an explicit object handed to
//! the orchestrator; there is no global instance.

use llamarun_core::{RunnerEvent, RunnerEventEmitter};
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel capacity for runner events
const CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for runner lifecycle events
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<RunnerEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to runner events
    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerEventEmitter for EventBroadcaster {
    fn emit(&self, event: RunnerEvent) {
        // Only send if there are receivers
        if self.sender.receiver_count() > 0 {
            debug!(?event, "Broadcasting runner event");
            let _ = self.sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.emit(RunnerEvent::started("m"));
        assert_eq!(rx.recv().await.unwrap(), RunnerEvent::started("m"));
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);
        broadcaster.emit(RunnerEvent::stopped("m"));
    }
}
