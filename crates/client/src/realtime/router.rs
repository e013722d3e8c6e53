//! Routes inbound messages to the listeners registered for their event type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use kycwatch_shared::{EventType, InboundMessage, WireError};
use parking_lot::Mutex;
use serde_json::Value;

/// A callback registered for one or more event types.
///
/// Listeners are compared by identity: clones of the same `Listener` are equal,
/// two listeners built from identical closures are not.
#[derive(Clone)]
pub struct Listener(Arc<dyn Fn(&Value) + Send + Sync>);

impl Listener {
    pub fn new(f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, data: &Value) {
        (self.0)(data)
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", self.addr())
    }
}

/// Fan-out of inbound messages by [`EventType`].
#[derive(Default)]
pub struct EventRouter {
    listeners: Mutex<HashMap<EventType, Vec<Listener>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event_type`. Returns false if it was already registered.
    pub fn add_listener(&self, event_type: EventType, listener: Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let set = listeners.entry(event_type).or_default();
        if set.contains(&listener) {
            return false;
        }
        set.push(listener);
        true
    }

    /// Remove `listener` from `event_type`. Returns false if it was not registered.
    pub fn remove_listener(&self, event_type: EventType, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(set) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before = set.len();
        set.retain(|l| l != listener);
        let removed = set.len() != before;
        if set.is_empty() {
            listeners.remove(&event_type);
        }
        removed
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners.lock().get(&event_type).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Invoke every listener registered for the message's type, in registration order.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners still run.
    /// Returns the number of listeners that completed.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let event_type = message.event_type();
        // Snapshot so listeners can (un)register from inside their callback.
        let snapshot = match self.listeners.lock().get(&event_type) {
            Some(set) => set.clone(),
            None => {
                tracing::trace!(%event_type, "no listeners");
                return 0;
            }
        };

        let mut delivered = 0;
        for listener in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.call(message.data()))) {
                Ok(()) => delivered += 1,
                Err(panic) => tracing::error!(
                    %event_type,
                    ?listener,
                    panic = panic_message(&*panic),
                    "listener panicked during dispatch"
                ),
            }
        }
        delivered
    }

    /// Parse a raw frame and dispatch it. Malformed frames and unknown types are
    /// logged and dropped.
    pub fn dispatch_raw(&self, text: &str) -> usize {
        match InboundMessage::parse(text) {
            Ok(message) => self.dispatch(&message),
            Err(WireError::UnknownType(tag)) => {
                tracing::warn!(tag, "dropping message with unknown type");
                0
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed message");
                0
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
