//! Real-time KYC notifications.
//!
//! This module provides:
//! - A shared persistent socket with capped exponential-backoff reconnect
//! - A per-key polling fallback once reconnects are exhausted
//! - Fan-out of typed events to any number of listeners
//! - Scoped handles that unregister on drop
//!
//! # Architecture
//!
//! ```text
//!   KycWatch / ListenerGuard          (binding)
//!              │ subscribe / drop
//!              ▼
//!   ┌─────────────────────────┐
//!   │     RealtimeClient      │ ── SubscriptionRegistry
//!   └─────────────────────────┘
//!        │ open/close      │ start/stop
//!        ▼                 ▼
//!   Reconnection       FallbackPoller
//!   Controller         (one timer per key)
//!   (one socket)           │
//!        │ frames          │ kyc_update
//!        └──────┬──────────┘
//!               ▼
//!          EventRouter ──▶ listeners
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use kycwatch_client::{RealtimeClient, RealtimeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RealtimeClient::from_config(RealtimeConfig::from_env()?);
//!
//! let _verified = client.on_document_verified(|doc| println!("verified: {doc}"));
//! let mut watch = client.watch("inv-42");
//! loop {
//!     watch.changed().await;
//!     println!("{:?}", watch.snapshot());
//! }
//! # }
//! ```

mod binding;
mod client;
mod controller;
mod poller;
mod registry;
mod router;
mod state;
mod transport;

pub use binding::{KycSnapshot, KycWatch, ListenerGuard};
pub use client::RealtimeClient;
pub use controller::{ControllerHooks, ReconnectionController};
pub use poller::{FallbackPoller, KycFetcher};
pub use router::{EventRouter, Listener};
pub use state::{ConnectionState, RetryState};
pub use transport::{FrameStream, SocketTransport, TransportError, WebSocketTransport};
