//! Event bus: named channels of synchronous callbacks, plus a tokio
//! broadcast stream of every dispatched event for async observers.
//!
//! Callbacks run in registration order on the dispatching thread. A callback
//! that fails or panics is logged and skipped; later callbacks still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{trace, warn};
use uuid::Uuid;

const BUS_CAPACITY: usize = 256;

pub type Callback = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

/// A dispatched event, as seen by broadcast subscribers.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub name: String,
    pub data: Value,
    pub dispatched_at: DateTime<Utc>,
}

pub struct EventBus {
    callbacks: RwLock<HashMap<String, Vec<(SubscriberId, Callback)>>>,
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            callbacks: RwLock::new(HashMap::new()),
            sender,
        }
    }

    /// Append a callback for `event`. Registering the same closure twice
    /// makes it fire twice.
    pub fn register<F>(&self, event: &str, callback: F) -> SubscriberId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriberId(Uuid::new_v4());
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        trace!("Subscribed {:?} to {}", id, event);
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unregister(&self, event: &str, id: SubscriberId) -> bool {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = callbacks.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            callbacks.remove(event);
        }
        removed
    }

    /// Invoke every callback registered for `event` with `data`.
    /// No subscribers is not an error.
    pub fn dispatch(&self, event: &str, data: Value) {
        // Snapshot the list so callbacks may (un)subscribe while we iterate.
        let subscribers: Vec<(SubscriberId, Callback)> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .cloned()
            .unwrap_or_default();

        for (id, callback) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| callback(&data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Subscriber {:?} to {} failed: {:#}", id, event, e),
                Err(_) => warn!("Subscriber {:?} to {} panicked", id, event),
            }
        }

        let _ = self.sender.send(BusEvent {
            name: event.to_string(),
            data,
            dispatched_at: Utc::now(),
        });
    }

    /// Stream of every event dispatched from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn dispatch_runs_callbacks_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.register("tick", move |data| {
                seen.lock().unwrap().push(format!("{tag}{}", data["n"]));
                Ok(())
            });
        }
        bus.dispatch("tick", json!({"n": 1}));
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn dispatch_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.dispatch("nobody.listens", Value::Null);
        assert_eq!(bus.subscriber_count("nobody.listens"), 0);
    }

    #[test]
    fn duplicate_registration_fires_twice() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let callback = {
            let count = count.clone();
            move |_: &Value| -> anyhow::Result<()> {
                *count.lock().unwrap() += 1;
                Ok(())
            }
        };
        bus.register("tick", callback.clone());
        bus.register("tick", callback);
        bus.dispatch("tick", Value::Null);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn failing_subscriber_does_not_stop_others() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));
        bus.register("tick", |_| anyhow::bail!("boom"));
        bus.register("tick", |_| panic!("kaboom"));
        {
            let reached = reached.clone();
            bus.register("tick", move |_| {
                *reached.lock().unwrap() = true;
                Ok(())
            });
        }
        bus.dispatch("tick", Value::Null);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn callback_can_unregister_itself() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(Mutex::new(0));
        let id_slot: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));
        let id = {
            let weak = Arc::downgrade(&bus);
            let count = count.clone();
            let id_slot = id_slot.clone();
            bus.register("tick", move |_| {
                *count.lock().unwrap() += 1;
                let id = *id_slot.lock().unwrap();
                if let (Some(bus), Some(id)) = (weak.upgrade(), id) {
                    bus.unregister("tick", id);
                }
                Ok(())
            })
        };
        *id_slot.lock().unwrap() = Some(id);

        bus.dispatch("tick", Value::Null);
        bus.dispatch("tick", Value::Null);
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.subscriber_count("tick"), 0);
    }

    #[tokio::test]
    async fn broadcast_sees_dispatched_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.dispatch("registry.tool.register", json!({"origin": "o", "id": "i"}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "registry.tool.register");
        assert_eq!(event.data["id"], "i");
    }
}
