use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::events::ServerEvent;

/// Broadcast hub for one match's event stream.
pub struct EventHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

/// Registry of per-match event hubs.
///
/// A hub is created lazily on first use and dropped when the match is torn
/// down; subscribers of a dropped hub see their stream end.
pub struct EventHubs {
    capacity: usize,
    hubs: DashMap<Uuid, EventHub>,
}

impl EventHubs {
    /// Build the registry with a per-hub channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hubs: DashMap::new(),
        }
    }

    /// Subscribe to the event stream of one match, creating the hub if needed.
    pub fn subscribe(&self, match_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.hubs
            .entry(match_id)
            .or_insert_with(|| EventHub::new(self.capacity))
            .subscribe()
    }

    /// Broadcast an event to all subscribers of one match.
    pub fn broadcast(&self, match_id: Uuid, event: ServerEvent) {
        if let Some(hub) = self.hubs.get(&match_id) {
            hub.broadcast(event);
        }
    }

    /// Drop the hub of a finished match, closing its subscriber streams.
    pub fn remove(&self, match_id: Uuid) {
        self.hubs.remove(&match_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::events::ServerEvent;

    #[tokio::test]
    async fn broadcast_reaches_only_matching_subscribers() {
        let hubs = EventHubs::new(8);
        let match_a = Uuid::new_v4();
        let match_b = Uuid::new_v4();

        let mut rx_a = hubs.subscribe(match_a);
        let mut rx_b = hubs.subscribe(match_b);

        hubs.broadcast(
            match_a,
            ServerEvent::new(Some("info".to_string()), "hello".to_string()),
        );

        let event = rx_a.recv().await.unwrap();
        assert_eq!(event.data, "hello");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn removing_a_hub_closes_its_streams() {
        let hubs = EventHubs::new(8);
        let match_id = Uuid::new_v4();
        let mut rx = hubs.subscribe(match_id);

        hubs.remove(match_id);
        assert!(rx.recv().await.is_err());
    }
}
