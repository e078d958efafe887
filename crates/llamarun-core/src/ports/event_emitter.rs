//! Event emitter trait for backend lifecycle events.
//!
//! Implementations handle transport details (broadcast channels, logs, etc.).

use crate::events::RunnerEvent;

/// Trait for emitting runner events.
///
/// # Implementations
///
/// - `NoopEmitter` - For tests and contexts without a listener
/// - `EventBroadcaster` in the runtime crate - fan-out over a broadcast channel
pub trait RunnerEventEmitter: Send + Sync {
    /// Emit an event. Must not block.
    fn emit(&self, event: RunnerEvent);
}

/// A no-op event emitter.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl RunnerEventEmitter for NoopEmitter {
    fn emit(&self, _event: RunnerEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter_as_trait_object() {
        let emitter: Arc<dyn RunnerEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(RunnerEvent::stopped("m"));
    }
}
