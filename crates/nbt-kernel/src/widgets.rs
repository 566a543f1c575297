//! Cache of live group and data widgets.
//!
//! Once a widget has been produced for a group or datum, later lookups get
//! the same instance back, so a displayed widget can be swapped in place.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;
use tracing::debug;

use nbt_types::entity::REFRESH_DATA_EVENT;
use nbt_types::Widget;

use crate::events::EventBus;

pub type WidgetFactory = Arc<dyn Fn() -> Widget + Send + Sync>;

/// A cached widget, either built or still to be built on first lookup.
#[derive(Clone)]
pub enum WidgetSlot {
    Direct(Widget),
    Deferred(WidgetFactory),
}

impl WidgetSlot {
    pub fn deferred<F>(factory: F) -> Self
    where
        F: Fn() -> Widget + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(factory))
    }
}

impl fmt::Debug for WidgetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(w) => f.debug_tuple("Direct").field(&w.id).finish(),
            Self::Deferred(_) => f.write_str("Deferred(<fn>)"),
        }
    }
}

type SlotMap = RwLock<HashMap<(String, String), WidgetSlot>>;

pub struct WidgetCache {
    groups: SlotMap,
    data: SlotMap,
    events: Arc<EventBus>,
}

impl WidgetCache {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            data: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Cache the widget for `(origin, group)` and announce the refresh.
    pub fn set_group_widget(&self, origin: &str, group: &str, slot: WidgetSlot) {
        insert(&self.groups, origin, group, slot);
        debug!("Group widget set: {} | {}", origin, group);
        self.events.dispatch(
            REFRESH_DATA_EVENT,
            json!({ "origin": origin, "group": group }),
        );
    }

    /// Cache the widget for `(origin, uri)` and announce the refresh.
    pub fn set_data_widget(&self, origin: &str, uri: &str, slot: WidgetSlot) {
        insert(&self.data, origin, uri, slot);
        debug!("Data widget set: {} | {}", origin, uri);
        self.events.dispatch(
            REFRESH_DATA_EVENT,
            json!({ "origin": origin, "id": uri }),
        );
    }

    pub fn group_widget(&self, origin: &str, group: &str) -> Option<Widget> {
        resolve(&self.groups, origin, group)
    }

    pub fn data_widget(&self, origin: &str, uri: &str) -> Option<Widget> {
        resolve(&self.data, origin, uri)
    }

    pub fn has_group_widget(&self, origin: &str, group: &str) -> bool {
        contains(&self.groups, origin, group)
    }

    pub fn has_data_widget(&self, origin: &str, uri: &str) -> bool {
        contains(&self.data, origin, uri)
    }
}

fn insert(map: &SlotMap, origin: &str, key: &str, slot: WidgetSlot) {
    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert((origin.to_string(), key.to_string()), slot);
}

fn contains(map: &SlotMap, origin: &str, key: &str) -> bool {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(&(origin.to_string(), key.to_string()))
}

/// Look up a slot, building deferred widgets once and caching the result.
fn resolve(map: &SlotMap, origin: &str, key: &str) -> Option<Widget> {
    let cache_key = (origin.to_string(), key.to_string());
    let factory = match map
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&cache_key)?
    {
        WidgetSlot::Direct(widget) => return Some(widget.clone()),
        WidgetSlot::Deferred(factory) => factory.clone(),
    };

    // Built outside the lock: the factory may itself consult the cache.
    let built = factory();

    let mut slots = map.write().unwrap_or_else(PoisonError::into_inner);
    match slots.get(&cache_key) {
        Some(WidgetSlot::Direct(existing)) => Some(existing.clone()),
        Some(WidgetSlot::Deferred(current)) if !Arc::ptr_eq(current, &factory) => {
            // Replaced while we were building; leave the newer slot alone.
            Some(built)
        }
        _ => {
            slots.insert(cache_key, WidgetSlot::Direct(built.clone()));
            Some(built)
        }
    }
}
