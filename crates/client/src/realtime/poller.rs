//! Polling fallback: approximates real-time delivery with a periodic fetch per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use kycwatch_shared::{ApiError, InboundMessage};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::router::EventRouter;

/// Fetches the current KYC state of one subscription key.
#[async_trait]
pub trait KycFetcher: Send + Sync + 'static {
    async fn fetch_kyc(&self, key: &str) -> Result<Value, ApiError>;
}

struct PollTimer {
    id: u64,
    task: JoinHandle<()>,
}

/// Per-key poll timers feeding synthesized `kyc_update` messages into the router.
pub struct FallbackPoller {
    fetcher: Arc<dyn KycFetcher>,
    router: Arc<EventRouter>,
    interval: Duration,
    timers: Mutex<HashMap<String, PollTimer>>,
    next_id: AtomicU64,
}

impl FallbackPoller {
    pub fn new(fetcher: Arc<dyn KycFetcher>, router: Arc<EventRouter>, interval: Duration) -> Self {
        Self {
            fetcher,
            router,
            interval: interval.max(Duration::from_millis(1)),
            timers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Start polling `key`. Returns false if a timer for `key` already exists.
    ///
    /// The first request goes out one interval after the call.
    pub fn start(self: &Arc<Self>, key: &str) -> bool {
        let mut timers = self.timers.lock();
        if timers.contains_key(key) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(key, "cannot start polling outside a tokio runtime");
            return false;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = runtime.spawn(poll_loop(
            Arc::downgrade(self),
            self.fetcher.clone(),
            key.to_string(),
            id,
            self.interval,
        ));
        timers.insert(key.to_string(), PollTimer { id, task });

        tracing::info!(
            key,
            interval_ms = self.interval.as_millis() as u64,
            "polling fallback started"
        );
        true
    }

    /// Stop polling `key`, cancelling any request still in flight.
    pub fn stop(&self, key: &str) -> bool {
        let Some(timer) = self.timers.lock().remove(key) else {
            return false;
        };
        timer.task.abort();
        tracing::info!(key, "polling fallback stopped");
        true
    }

    pub fn stop_all(&self) {
        let timers: Vec<(String, PollTimer)> = self.timers.lock().drain().collect();
        for (key, timer) in timers {
            timer.task.abort();
            tracing::debug!(key, "polling fallback stopped");
        }
    }

    pub fn is_polling(&self, key: &str) -> bool {
        self.timers.lock().contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.timers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn is_current(&self, key: &str, id: u64) -> bool {
        self.timers.lock().get(key).is_some_and(|t| t.id == id)
    }

    fn deliver(&self, key: &str, id: u64, outcome: Result<Result<Value, ApiError>, JoinError>) {
        if !self.is_current(key, id) {
            return;
        }
        match outcome {
            Ok(Ok(data)) => {
                let delivered = self.router.dispatch(&InboundMessage::kyc_update(data));
                tracing::debug!(key, delivered, "poll result dispatched");
            }
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "poll request failed, retrying next tick")
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::warn!(key, error = %e, "poll request task failed"),
        }
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.task.abort();
        }
    }
}

/// One timer. A slow request never delays the next tick; its result is
/// dispatched whenever it lands.
async fn poll_loop(
    poller: Weak<FallbackPoller>,
    fetcher: Arc<dyn KycFetcher>,
    key: String,
    id: u64,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fetcher = fetcher.clone();
                let key = key.clone();
                in_flight.spawn(async move { fetcher.fetch_kyc(&key).await });
            }
            Some(outcome) = in_flight.join_next() => {
                let Some(poller) = poller.upgrade() else {
                    return;
                };
                poller.deliver(&key, id, outcome);
            }
        }
    }
}
