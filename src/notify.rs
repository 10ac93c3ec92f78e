use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::StoreEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for order changes, one channel per location.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<StoreEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes for a location. Creates the channel if needed.
    pub fn subscribe(&self, location_id: &str) -> broadcast::Receiver<StoreEvent> {
        let sender = self
            .channels
            .entry(location_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, location_id: &str, event: &StoreEvent) {
        if let Some(sender) = self.channels.get(location_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send to every location channel.
    pub fn send_all(&self, event: &StoreEvent) {
        for sender in self.channels.iter() {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, location_id: &str) {
        self.channels.remove(location_id);
    }
}
