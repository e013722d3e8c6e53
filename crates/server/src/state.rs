//! Application state shared across request handlers.

use std::collections::HashMap;
use std::sync::Arc;

use kycwatch_shared::{EventType, InboundMessage};
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};

const CHANNEL_CAPACITY: usize = 100;

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    pub hub: Arc<KycHub>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-key event channels and the last `kyc_update` payload seen for each key.
#[derive(Default)]
pub struct KycHub {
    channels: RwLock<HashMap<String, broadcast::Sender<InboundMessage>>>,
    latest: RwLock<HashMap<String, Value>>,
}

impl KycHub {
    /// Get or create the broadcast channel for `key`
    async fn get_or_create_channel(&self, key: &str) -> broadcast::Sender<InboundMessage> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(key) {
                return sender.clone();
            }
        }

        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(key) {
            return sender.clone();
        }

        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(key.to_string(), tx.clone());
        tx
    }

    pub async fn subscribe(&self, key: &str) -> broadcast::Receiver<InboundMessage> {
        self.get_or_create_channel(key).await.subscribe()
    }

    /// Drop the channel for `key` once its last socket is gone.
    pub async fn release(&self, key: &str) {
        let mut channels = self.channels.write().await;
        if channels.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(key);
        }
    }

    /// Record and fan out `message`. Returns the number of sockets it reached.
    pub async fn publish(&self, key: &str, message: InboundMessage) -> usize {
        if message.event_type() == EventType::KycUpdate {
            self.latest
                .write()
                .await
                .insert(key.to_string(), message.data().clone());
        }

        let sender = self.channels.read().await.get(key).cloned();
        match sender {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn latest(&self, key: &str) -> Option<Value> {
        self.latest.read().await.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_subscribers_of_that_key_only() {
        let hub = KycHub::default();
        let mut a = hub.subscribe("a").await;
        let mut b = hub.subscribe("b").await;

        let msg = InboundMessage::new(EventType::DocumentVerified, json!({"id": "doc1"}));
        assert_eq!(hub.publish("a", msg.clone()).await, 1);

        assert_eq!(a.recv().await.unwrap(), msg);
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_kyc_updates_become_latest() {
        let hub = KycHub::default();
        assert_eq!(hub.latest("a").await, None);

        hub.publish("a", InboundMessage::new(EventType::DocumentFlagged, json!(1)))
            .await;
        assert_eq!(hub.latest("a").await, None);

        hub.publish("a", InboundMessage::kyc_update(json!({"level": "approved"})))
            .await;
        assert_eq!(hub.latest("a").await, Some(json!({"level": "approved"})));
    }

    #[tokio::test]
    async fn release_keeps_channels_with_live_receivers() {
        let hub = KycHub::default();
        let rx = hub.subscribe("a").await;
        hub.release("a").await;
        assert_eq!(hub.publish("a", InboundMessage::kyc_update(json!(1))).await, 1);

        drop(rx);
        hub.release("a").await;
        assert!(hub.channels.read().await.is_empty());
    }
}
