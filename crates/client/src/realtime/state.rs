//! Connection state and retry bookkeeping for the persistent socket.

use std::fmt;
use std::time::Duration;

use crate::config::ReconnectConfig;

/// Connection state of the client's shared socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// The socket was abandoned; updates arrive through the polling fallback.
    Polling,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    /// True while updates come from the fallback rather than the live socket.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConnectionState::Polling)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {attempt})")
            }
            ConnectionState::Polling => f.write_str("polling"),
        }
    }
}

/// Consecutive failures and the delay before the next reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryState {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempts: 0,
            delay: config.delay_for_attempt(1),
        }
    }

    pub fn reset(&mut self, config: &ReconnectConfig) {
        *self = Self::new(config);
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// `max_attempts` reconnects have been spent.
    pub fn next_delay(&mut self, config: &ReconnectConfig) -> Option<Duration> {
        if self.attempts >= config.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.delay;
        self.delay = config.delay_for_attempt(self.attempts + 1);
        Some(delay)
    }
}
