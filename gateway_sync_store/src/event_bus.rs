// Licensed under the MIT License.

//! The event bus: fan-out of asset/attribute change events to the rest of the
//! platform. Treated as an external collaborator.

use async_trait::async_trait;
use gateway_sync_protocol::model::{AssetEvent, AttributeEvent};
use tokio::sync::broadcast;

/// A change event published to the event bus.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    Attribute(AttributeEvent),
    Asset(AssetEvent),
}

/// Fan-out of asset/attribute change events. Publishing never blocks on the presence
/// of subscribers.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: BusEvent);
}

/// An in-memory [`EventBus`] backed by a [`tokio::sync::broadcast`] channel — the same
/// fan-out primitive the command-invoker layer of the protocol stack this subsystem is
/// modeled on uses internally for its own event distribution.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: BusEvent) {
        // No subscribers is not an error: the bus is fire-and-forget fan-out, not a
        // queue with delivery guarantees to a specific consumer.
        let _ = self.sender.send(event);
    }
}
