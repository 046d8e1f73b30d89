//! Broadcast event bus for distributing `OrchestratorEvent` to subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing never blocks the execution
//! path: with no subscribers it is a no-op, and slow subscribers observe
//! `Lagged` instead of applying back-pressure.

use switchyard_types::event::OrchestratorEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for execution, ranking and health events.
///
/// Cloning the bus clones the sender, so the orchestrator, health monitor and
/// background tasks can all publish onto the same channel.
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
