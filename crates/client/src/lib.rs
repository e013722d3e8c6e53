//! kycwatch client
//!
//! Keeps KYC document state synchronized in real time: a shared websocket with
//! backoff reconnect, a polling fallback, and typed event fan-out to any number
//! of scoped subscribers.

pub mod api_client;
pub mod config;
pub mod realtime;

pub use api_client::ApiClient;
pub use config::{ConfigError, RealtimeConfig, ReconnectConfig};
pub use kycwatch_shared::{EventType, InboundMessage};
pub use realtime::{
    ConnectionState, KycSnapshot, KycWatch, Listener, ListenerGuard, RealtimeClient,
};
