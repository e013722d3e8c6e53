//! Scoped bindings for UI consumers.
//!
//! Both handles register on creation and unregister when dropped, so a
//! component that stores one for its lifetime can never leak a listener (and
//! with it, a poll timer) past unmount.

use std::sync::Weak;

use chrono::{DateTime, Utc};
use kycwatch_shared::{EventType, InboundMessage, KycStatus};
use serde_json::Value;
use tokio::sync::watch;

use super::client::RealtimeClient;
use super::router::{EventRouter, Listener};
use super::state::ConnectionState;

/// Keeps a typed listener registered until dropped.
pub struct ListenerGuard {
    router: Weak<EventRouter>,
    event_type: EventType,
    listener: Listener,
}

impl ListenerGuard {
    pub(crate) fn new(
        router: Weak<EventRouter>,
        event_type: EventType,
        listener: Listener,
    ) -> Self {
        Self {
            router,
            event_type,
            listener,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.remove_listener(self.event_type, &self.listener);
        }
    }
}

/// Read-only view handed to UI code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KycSnapshot {
    pub latest_data: Option<Value>,
    pub last_update: Option<DateTime<Utc>>,
    pub connection_state: ConnectionState,
}

impl KycSnapshot {
    /// The latest payload as a [`KycStatus`], if it has that shape.
    pub fn status(&self) -> Option<KycStatus> {
        let data = self.latest_data.clone()?;
        InboundMessage::kyc_update(data).decode().ok()
    }
}

#[derive(Debug, Clone, Default)]
struct Latest {
    data: Option<Value>,
    at: Option<DateTime<Utc>>,
}

/// Live subscription to one key's `kyc_update` stream.
///
/// Created by [`RealtimeClient::watch`]; unsubscribes on drop.
pub struct KycWatch {
    client: RealtimeClient,
    key: String,
    listener: Listener,
    latest: watch::Receiver<Latest>,
    state: watch::Receiver<ConnectionState>,
}

impl KycWatch {
    pub(crate) fn new(client: RealtimeClient, key: &str) -> Self {
        let (latest_tx, latest) = watch::channel(Latest::default());
        let listener = Listener::new(move |data| {
            latest_tx.send_replace(Latest {
                data: Some(data.clone()),
                at: Some(Utc::now()),
            });
        });

        client.subscribe(key, &listener);
        let state = client.state_changes();

        Self {
            client,
            key: key.to_string(),
            listener,
            latest,
            state,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> KycSnapshot {
        let latest = self.latest.borrow().clone();
        KycSnapshot {
            latest_data: latest.data,
            last_update: latest.at,
            connection_state: *self.state.borrow(),
        }
    }

    pub fn latest_data(&self) -> Option<Value> {
        self.latest.borrow().data.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until new data arrives or the connection state changes.
    pub async fn changed(&mut self) {
        // Both senders outlive `self`: one sits in our own listener, the other
        // in the client we hold.
        tokio::select! {
            _ = self.latest.changed() => {}
            _ = self.state.changed() => {}
        }
    }

    /// Unsubscribe now rather than at end of scope.
    pub fn dispose(self) {}
}

impl Drop for KycWatch {
    fn drop(&mut self) {
        self.client.unsubscribe(&self.key, &self.listener);
    }
}
