//! `RealtimeClient`: the explicitly constructed owner of the socket, pollers,
//! router and subscriptions.

use std::sync::{Arc, Weak};

use kycwatch_shared::{EventType, InboundMessage};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

use super::binding::{KycWatch, ListenerGuard};
use super::controller::{ControllerHooks, ReconnectionController};
use super::poller::{FallbackPoller, KycFetcher};
use super::registry::SubscriptionRegistry;
use super::router::{EventRouter, Listener};
use super::state::{ConnectionState, RetryState};
use super::transport::{SocketTransport, WebSocketTransport};
use crate::api_client::ApiClient;
use crate::config::{socket_url, RealtimeConfig};

struct Shared {
    router: Arc<EventRouter>,
    poller: Arc<FallbackPoller>,
    controller: Arc<ReconnectionController>,
    registry: Mutex<SubscriptionRegistry>,
}

/// Real-time KYC notification client.
///
/// Construct one per application session and hand clones to every consumer;
/// clones share the same socket, pollers and listeners. Dropping the last clone
/// tears everything down. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

impl RealtimeClient {
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn SocketTransport>,
        fetcher: Arc<dyn KycFetcher>,
    ) -> Self {
        let router = Arc::new(EventRouter::new());
        let poller = Arc::new(FallbackPoller::new(
            fetcher,
            router.clone(),
            config.poll_interval,
        ));

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let on_connected = weak.clone();
            let on_exhausted = weak.clone();
            let hooks = ControllerHooks::new()
                .on_connected(move || {
                    if let Some(shared) = on_connected.upgrade() {
                        shared.transport_restored();
                    }
                })
                .on_exhausted(move |key| {
                    if let Some(shared) = on_exhausted.upgrade() {
                        shared.transport_exhausted(key);
                    }
                });

            let ws_base = config.ws_base.clone();
            let controller = Arc::new(ReconnectionController::new(
                config.reconnect.clone(),
                transport,
                router.clone(),
                move |key| socket_url(&ws_base, key),
                hooks,
            ));

            Shared {
                router,
                poller,
                controller,
                registry: Mutex::new(SubscriptionRegistry::default()),
            }
        });

        Self { shared }
    }

    /// Client wired to the real websocket transport and REST fetcher.
    pub fn from_config(config: RealtimeConfig) -> Self {
        let fetcher = Arc::new(ApiClient::from_config(&config));
        Self::new(config, Arc::new(WebSocketTransport), fetcher)
    }

    /// Register `listener` for `kyc_update` messages and express interest in `key`.
    ///
    /// Subscribing the same listener twice is a no-op. The first interest in a key
    /// opens the shared socket (or starts polling the key if the socket has been
    /// abandoned).
    pub fn subscribe(&self, key: &str, listener: &Listener) {
        self.subscribe_to(key, &[EventType::KycUpdate], listener);
    }

    /// Like [`subscribe`](Self::subscribe) for an explicit set of event types.
    pub fn subscribe_to(&self, key: &str, event_types: &[EventType], listener: &Listener) {
        let inserted = self
            .shared
            .registry
            .lock()
            .insert(key, listener, event_types);

        for event_type in inserted.new_types {
            self.shared.router.add_listener(event_type, listener.clone());
        }
        if inserted.first_for_key {
            tracing::debug!(key, "first subscriber");
            self.shared.acquire(key);
        }
    }

    /// Remove `listener`'s interest in `key`. Idempotent.
    ///
    /// When the key has no listeners left its poller is stopped and, if the
    /// socket is bound to it, the socket is closed.
    pub fn unsubscribe(&self, key: &str, listener: &Listener) {
        let released = {
            let mut registry = self.shared.registry.lock();
            let Some(removed) = registry.remove(key, listener) else {
                return;
            };
            for event_type in &removed.event_types {
                if !registry.holds(listener, *event_type) {
                    self.shared.router.remove_listener(*event_type, listener);
                }
            }
            removed.key_released
        };

        if released {
            tracing::debug!(key, "last subscriber left");
            self.shared.release(key);
        }
    }

    /// Process-wide teardown: stop all pollers, close the socket, cancel pending
    /// reconnects and clear every listener. The client can be reused afterwards.
    pub fn cleanup(&self) {
        self.shared.controller.shutdown();
        self.shared.poller.stop_all();
        self.shared.registry.lock().clear();
        self.shared.router.clear();
        tracing::info!("realtime client cleaned up");
    }

    /// Watch `key` until the returned handle is dropped.
    pub fn watch(&self, key: &str) -> KycWatch {
        KycWatch::new(self.clone(), key)
    }

    pub fn on_kyc_update(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> ListenerGuard {
        self.on(EventType::KycUpdate, f)
    }

    pub fn on_document_uploaded(
        &self,
        f: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.on(EventType::DocumentUploaded, f)
    }

    pub fn on_document_verified(
        &self,
        f: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.on(EventType::DocumentVerified, f)
    }

    pub fn on_document_rejected(
        &self,
        f: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.on(EventType::DocumentRejected, f)
    }

    pub fn on_document_flagged(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> ListenerGuard {
        self.on(EventType::DocumentFlagged, f)
    }

    pub fn on_expiry_alert(&self, f: impl Fn(&Value) + Send + Sync + 'static) -> ListenerGuard {
        self.on(EventType::ExpiryAlert, f)
    }

    /// Register `f` for `event_type` until the returned guard is dropped.
    pub fn on(
        &self,
        event_type: EventType,
        f: impl Fn(&Value) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let listener = Listener::new(f);
        self.shared.router.add_listener(event_type, listener.clone());
        ListenerGuard::new(Arc::downgrade(&self.shared.router), event_type, listener)
    }

    /// Deliver a locally produced message, e.g. right after a REST mutation.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        self.shared.router.dispatch(message)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.controller.state()
    }

    /// Receiver that observes every connection state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.controller.subscribe_state()
    }

    pub fn retry_state(&self) -> RetryState {
        self.shared.controller.retry_state()
    }

    pub fn is_polling(&self, key: &str) -> bool {
        self.shared.poller.is_polling(key)
    }

    /// Keys with at least one subscriber, sorted.
    pub fn active_keys(&self) -> Vec<String> {
        self.shared.registry.lock().keys()
    }

    /// Distinct listeners subscribed to `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.shared.registry.lock().listener_count(key)
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.shared.router.listener_count(event_type)
    }
}

impl Shared {
    fn acquire(&self, key: &str) {
        if self.controller.state() == ConnectionState::Polling {
            self.poller.start(key);
        } else {
            self.controller.open(key);
        }
    }

    fn release(&self, key: &str) {
        self.poller.stop(key);
        let next = self.registry.lock().keys().into_iter().next();
        match next {
            // The remaining keys keep polling; the socket is not retried.
            Some(next) if self.controller.state() == ConnectionState::Polling => {
                self.controller.rebind_polling(key, &next);
            }
            Some(next) => {
                if self.controller.close(key) {
                    tracing::info!(from = key, to = %next, "rebinding socket");
                    self.controller.open(&next);
                }
            }
            None => {
                self.controller.close(key);
            }
        }
    }

    /// The socket is gone for good; every key with interest switches to polling.
    fn transport_exhausted(&self, key: &str) {
        let keys = self.registry.lock().keys();
        tracing::info!(socket_key = key, keys = ?keys, "switching subscriptions to polling");
        for key in keys {
            self.poller.start(&key);
        }
    }

    fn transport_restored(&self) {
        let polled = self.poller.active_keys();
        if !polled.is_empty() {
            tracing::info!(keys = ?polled, "socket restored, stopping pollers");
            self.poller.stop_all();
        }
    }
}
