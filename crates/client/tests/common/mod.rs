//! In-memory transport and fetcher driven by the tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc;
use futures_util::StreamExt;
use kycwatch_client::realtime::{FrameStream, KycFetcher, SocketTransport, TransportError};
use kycwatch_client::{RealtimeClient, RealtimeConfig};
use kycwatch_shared::ApiError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;

type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Socket transport whose sockets are fed by the test.
pub struct ScriptedTransport {
    accept: AtomicBool,
    opens: Mutex<Vec<(Instant, String)>>,
    sockets: Mutex<Vec<FrameSender>>,
}

impl ScriptedTransport {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: AtomicBool::new(true),
            opens: Mutex::new(Vec::new()),
            sockets: Mutex::new(Vec::new()),
        })
    }

    pub fn refusing() -> Arc<Self> {
        let transport = Self::accepting();
        transport.set_accept(false);
        transport
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Number of open attempts, successful or not.
    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().iter().map(|(at, _)| *at).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.opens.lock().iter().map(|(_, url)| url.clone()).collect()
    }

    /// Sockets whose receiving end is still held by the client.
    pub fn live_sockets(&self) -> usize {
        self.sockets.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Deliver a text frame on the most recently opened socket.
    pub fn push_frame(&self, text: impl Into<String>) {
        let sockets = self.sockets.lock();
        let tx = sockets.last().expect("no socket was opened");
        tx.unbounded_send(Ok(text.into()))
            .expect("socket already closed by the client");
    }

    /// The server goes away: every open stream ends.
    pub fn drop_sockets(&self) {
        self.sockets.lock().clear();
    }
}

#[async_trait]
impl SocketTransport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<FrameStream, TransportError> {
        self.opens.lock().push((Instant::now(), url.to_string()));
        if !self.accept.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded();
        self.sockets.lock().push(tx);
        Ok(rx.boxed())
    }
}

/// Fetcher answering `{"investor_id": key, "n": call}`.
#[derive(Default)]
pub struct ScriptedFetcher {
    calls: AtomicUsize,
    times: Mutex<Vec<Instant>>,
    keys: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.times.lock().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }
}

#[async_trait]
impl KycFetcher for ScriptedFetcher {
    async fn fetch_kyc(&self, key: &str) -> Result<Value, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.times.lock().push(Instant::now());
        self.keys.lock().push(key.to_string());
        Ok(json!({ "investor_id": key, "n": n }))
    }
}

pub fn client(
    transport: &Arc<ScriptedTransport>,
    fetcher: &Arc<ScriptedFetcher>,
) -> RealtimeClient {
    RealtimeClient::new(
        RealtimeConfig::default().with_ws_base("ws://kyc.test"),
        transport.clone(),
        fetcher.clone(),
    )
}

/// Collects every payload a listener receives.
pub fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Value) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |data: &Value| sink.lock().push(data.clone()))
}

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Total time for the initial attempt plus five failed reconnects (1+2+4+8+16 s).
pub const EXHAUSTION: Duration = Duration::from_millis(31_000);
