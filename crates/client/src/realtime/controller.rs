//! Reconnection controller: owns the client's single persistent socket.
//!
//! The connection loop runs as one tokio task per `open`:
//!
//! ```text
//! Disconnected ──open──▶ Connecting ──ok──▶ Connected
//!                            ▲                  │ closed / error
//!                            │                  ▼
//!                      Reconnecting ◀──── Disconnected
//!                            │ attempts exhausted
//!                            ▼
//!                         Polling  (terminal until close)
//! ```
//!
//! Every transition is guarded by a generation counter, so a task that was
//! cancelled by `close` can never write state or dispatch a frame afterwards.

use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::router::EventRouter;
use super::state::{ConnectionState, RetryState};
use super::transport::SocketTransport;
use crate::config::ReconnectConfig;

type UrlBuilder = Arc<dyn Fn(&str) -> String + Send + Sync>;
type OnConnected = Arc<dyn Fn() + Send + Sync>;
type OnExhausted = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks the controller fires on the edges the rest of the client cares about.
#[derive(Clone, Default)]
pub struct ControllerHooks {
    on_connected: Option<OnConnected>,
    on_exhausted: Option<OnExhausted>,
}

impl ControllerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after every successful (re)connection.
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Arc::new(f));
        self
    }

    /// Called with the socket's key once reconnect attempts are exhausted.
    pub fn on_exhausted(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_exhausted = Some(Arc::new(f));
        self
    }

    fn emit_connected(&self) {
        if let Some(cb) = &self.on_connected {
            cb();
        }
    }

    fn emit_exhausted(&self, key: &str) {
        if let Some(cb) = &self.on_exhausted {
            cb(key);
        }
    }
}

struct ControllerState {
    retry: RetryState,
    generation: u64,
    /// Key the socket is bound to; kept while polling so `close` can find it.
    key: Option<String>,
    task: Option<JoinHandle<()>>,
}

enum Retry {
    After(std::time::Duration),
    Exhausted,
    Stale,
}

pub struct ReconnectionController {
    config: ReconnectConfig,
    transport: Arc<dyn SocketTransport>,
    router: Arc<EventRouter>,
    url_builder: UrlBuilder,
    hooks: ControllerHooks,
    inner: Mutex<ControllerState>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ReconnectionController {
    pub fn new(
        config: ReconnectConfig,
        transport: Arc<dyn SocketTransport>,
        router: Arc<EventRouter>,
        url_builder: impl Fn(&str) -> String + Send + Sync + 'static,
        hooks: ControllerHooks,
    ) -> Self {
        let retry = RetryState::new(&config);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            transport,
            router,
            url_builder: Arc::new(url_builder),
            hooks,
            inner: Mutex::new(ControllerState {
                retry,
                generation: 0,
                key: None,
                task: None,
            }),
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn retry_state(&self) -> RetryState {
        self.inner.lock().retry
    }

    /// Key the socket is currently bound to, if any.
    pub fn bound_key(&self) -> Option<String> {
        self.inner.lock().key.clone()
    }

    /// Open the socket for `key`.
    ///
    /// No-op (returns false) while a socket is connecting, connected or waiting to
    /// reconnect, and while the client is polling.
    pub fn open(self: &Arc<Self>, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.task.is_some() || self.state() == ConnectionState::Polling {
            tracing::debug!(key, state = %self.state(), "socket already active");
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(key, "cannot open socket outside a tokio runtime");
            return false;
        };

        inner.generation += 1;
        inner.key = Some(key.to_string());
        self.set_state(ConnectionState::Connecting);

        let url = (self.url_builder)(key);
        tracing::info!(key, url, "opening socket");
        inner.task = Some(runtime.spawn(connection_loop(
            Arc::downgrade(self),
            key.to_string(),
            url,
            inner.generation,
        )));
        true
    }

    /// Close the socket bound to `key` and cancel any pending reconnect.
    ///
    /// Returns false if the socket is not bound to `key`.
    pub fn close(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.key.as_deref() != Some(key) {
            return false;
        }
        self.teardown(&mut inner);
        tracing::info!(key, "socket closed");
        true
    }

    /// Move the binding of an abandoned socket from `key` to `next` without
    /// leaving `Polling`.
    ///
    /// Returns false unless the controller is polling and bound to `key`.
    pub fn rebind_polling(&self, key: &str, next: &str) -> bool {
        let mut inner = self.inner.lock();
        if self.state() != ConnectionState::Polling || inner.key.as_deref() != Some(key) {
            return false;
        }
        inner.key = Some(next.to_string());
        tracing::debug!(from = key, to = next, "polling binding moved");
        true
    }

    /// Close whatever socket is open, regardless of its key.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        self.teardown(&mut inner);
    }

    fn teardown(&self, inner: &mut ControllerState) {
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.key = None;
        inner.retry.reset(&self.config);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn mark_connected(&self, generation: u64) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.retry.reset(&self.config);
            self.set_state(ConnectionState::Connected);
        }
        self.hooks.emit_connected();
        true
    }

    fn plan_retry(&self, generation: u64) -> Retry {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Retry::Stale;
        }
        self.set_state(ConnectionState::Disconnected);
        match inner.retry.next_delay(&self.config) {
            Some(delay) => {
                self.set_state(ConnectionState::Reconnecting {
                    attempt: inner.retry.attempts,
                });
                Retry::After(delay)
            }
            None => Retry::Exhausted,
        }
    }

    fn begin_attempt(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        self.set_state(ConnectionState::Connecting);
        true
    }

    fn enter_polling(&self, generation: u64, key: &str) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            // The finishing task is this one; dropping its handle just detaches it.
            inner.task = None;
            self.set_state(ConnectionState::Polling);
        }
        tracing::warn!(
            key,
            attempts = self.config.max_attempts,
            "reconnect attempts exhausted, falling back to polling"
        );
        self.hooks.emit_exhausted(key);
    }
}

impl Drop for ReconnectionController {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().task.take() {
            task.abort();
        }
    }
}

async fn connection_loop(
    controller: Weak<ReconnectionController>,
    key: String,
    url: String,
    generation: u64,
) {
    loop {
        let Some(transport) = controller.upgrade().map(|c| c.transport.clone()) else {
            return;
        };

        match transport.open(&url).await {
            Ok(mut frames) => {
                let Some(this) = controller.upgrade() else {
                    return;
                };
                if !this.mark_connected(generation) {
                    return;
                }
                tracing::info!(key, "socket connected");
                drop(this);

                while let Some(frame) = frames.next().await {
                    let Some(this) = controller.upgrade() else {
                        return;
                    };
                    match frame {
                        Ok(text) => {
                            if !this.is_current(generation) {
                                return;
                            }
                            // A bad frame is not a transport failure.
                            this.router.dispatch_raw(&text);
                        }
                        Err(e) => {
                            tracing::warn!(key, error = %e, "socket error");
                            break;
                        }
                    }
                }
                tracing::info!(key, "socket closed by peer");
            }
            Err(e) => tracing::warn!(key, error = %e, "socket failed to open"),
        }

        let Some(this) = controller.upgrade() else {
            return;
        };
        match this.plan_retry(generation) {
            Retry::After(delay) => {
                tracing::info!(
                    key,
                    delay_ms = delay.as_millis() as u64,
                    attempt = this.retry_state().attempts,
                    "scheduling reconnect"
                );
                drop(this);
                tokio::time::sleep(delay).await;
                match controller.upgrade() {
                    Some(this) if this.begin_attempt(generation) => {}
                    _ => return,
                }
            }
            Retry::Exhausted => {
                this.enter_polling(generation, &key);
                return;
            }
            Retry::Stale => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::transport::{FrameStream, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    struct RefusingTransport {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl SocketTransport for RefusingTransport {
        async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connect {
                url: url.to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    fn refusing_controller(
        hooks: ControllerHooks,
    ) -> (Arc<ReconnectionController>, Arc<RefusingTransport>) {
        let transport = Arc::new(RefusingTransport {
            attempts: AtomicUsize::new(0),
        });
        let controller = Arc::new(ReconnectionController::new(
            ReconnectConfig::default(),
            transport.clone(),
            Arc::new(EventRouter::new()),
            |key| format!("ws://test/kyc/{key}"),
            hooks,
        ));
        (controller, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn open_is_noop_while_active() {
        let (controller, transport) = refusing_controller(ControllerHooks::new());

        assert!(controller.open("inv-1"));
        assert!(!controller.open("inv-1"));
        assert!(!controller.open("inv-2"));
        sleep(Duration::from_millis(1)).await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), ConnectionState::Reconnecting { attempt: 1 });
        assert_eq!(controller.bound_key().as_deref(), Some("inv-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_fires_hook_once() {
        let exhausted = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let exhausted_clone = exhausted.clone();
        let hooks = ControllerHooks::new()
            .on_exhausted(move |key| exhausted_clone.lock().push(key.to_string()));
        let (controller, transport) = refusing_controller(hooks);

        controller.open("inv-1");
        sleep(Duration::from_secs(120)).await;

        assert_eq!(controller.state(), ConnectionState::Polling);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);
        assert_eq!(*exhausted.lock(), vec!["inv-1".to_string()]);
        assert!(!controller.open("inv-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_reconnect() {
        let (controller, transport) = refusing_controller(ControllerHooks::new());

        controller.open("inv-1");
        sleep(Duration::from_millis(500)).await;
        assert!(!controller.close("inv-2"));
        assert!(controller.close("inv-1"));
        assert!(!controller.close("inv-1"));
        sleep(Duration::from_secs(120)).await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(controller.retry_state().attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_after_polling_allows_a_fresh_open() {
        let (controller, transport) = refusing_controller(ControllerHooks::new());

        controller.open("inv-1");
        sleep(Duration::from_secs(120)).await;
        assert_eq!(controller.state(), ConnectionState::Polling);

        assert!(controller.close("inv-1"));
        assert!(controller.open("inv-1"));
        sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 7);
        assert_eq!(controller.state(), ConnectionState::Reconnecting { attempt: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn rebind_only_moves_a_polling_binding() {
        let (controller, transport) = refusing_controller(ControllerHooks::new());

        controller.open("inv-1");
        assert!(!controller.rebind_polling("inv-1", "inv-2"));
        sleep(Duration::from_secs(120)).await;

        assert!(!controller.rebind_polling("inv-9", "inv-2"));
        assert!(controller.rebind_polling("inv-1", "inv-2"));
        assert_eq!(controller.bound_key().as_deref(), Some("inv-2"));
        assert_eq!(controller.state(), ConnectionState::Polling);
        assert!(!controller.close("inv-1"));
        assert!(controller.close("inv-2"));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);
    }
}
