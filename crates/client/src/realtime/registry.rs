//! Subscription bookkeeping: which listeners are interested in which keys.
//!
//! The registry tracks callbacks rather than a use-count, because callbacks are
//! what must stop firing. It performs no I/O; the client turns its answers into
//! `open`/`close`/`start`/`stop` calls.

use std::collections::HashMap;

use kycwatch_shared::EventType;

use super::router::Listener;

struct Registration {
    listener: Listener,
    event_types: Vec<EventType>,
}

/// Result of [`SubscriptionRegistry::insert`].
#[derive(Debug, PartialEq, Eq)]
pub struct Inserted {
    /// This was the first interest in the key.
    pub first_for_key: bool,
    /// Event types the listener was not yet registered for under this key.
    pub new_types: Vec<EventType>,
}

/// Result of [`SubscriptionRegistry::remove`].
#[derive(Debug, PartialEq, Eq)]
pub struct Removed {
    /// The key has no listeners left.
    pub key_released: bool,
    /// Event types the listener was registered for under this key.
    pub event_types: Vec<EventType>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    keys: HashMap<String, Vec<Registration>>,
}

impl SubscriptionRegistry {
    pub fn insert(
        &mut self,
        key: &str,
        listener: &Listener,
        event_types: &[EventType],
    ) -> Inserted {
        let first_for_key = !self.keys.contains_key(key);
        let registrations = self.keys.entry(key.to_string()).or_default();

        let index = match registrations.iter().position(|r| &r.listener == listener) {
            Some(index) => index,
            None => {
                registrations.push(Registration {
                    listener: listener.clone(),
                    event_types: Vec::new(),
                });
                registrations.len() - 1
            }
        };
        let registration = &mut registrations[index];

        let mut new_types = Vec::new();
        for &event_type in event_types {
            if !registration.event_types.contains(&event_type) {
                registration.event_types.push(event_type);
                new_types.push(event_type);
            }
        }

        Inserted {
            first_for_key,
            new_types,
        }
    }

    /// Remove `listener` from `key`. `None` if it was not registered there.
    pub fn remove(&mut self, key: &str, listener: &Listener) -> Option<Removed> {
        let registrations = self.keys.get_mut(key)?;
        let index = registrations.iter().position(|r| &r.listener == listener)?;
        let registration = registrations.remove(index);

        let key_released = registrations.is_empty();
        if key_released {
            self.keys.remove(key);
        }

        Some(Removed {
            key_released,
            event_types: registration.event_types,
        })
    }

    /// Whether any key still holds `listener` for `event_type`.
    pub fn holds(&self, listener: &Listener, event_type: EventType) -> bool {
        self.keys
            .values()
            .flatten()
            .any(|r| &r.listener == listener && r.event_types.contains(&event_type))
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.keys.get(key).map_or(0, Vec::len)
    }

    /// Keys with active interest, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
