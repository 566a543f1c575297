//! Two-level registries: origin -> local key -> entity.
//!
//! Both levels keep insertion order, so `list()` is stable across calls.
//! Re-registering an existing key replaces the entity in place.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use tracing::{debug, info, warn};

use nbt_types::{Data, Entity, Filter, NbError, NbResult, Tool};

use crate::events::EventBus;

pub type ToolRegistry = Registry<Tool>;
pub type DataRegistry = Registry<Data>;

/// Receiver of "registry contents changed" notifications.
pub trait UpdateHook: Send + Sync {
    fn registry_changed(&self);
}

struct OriginBucket<E> {
    origin: String,
    items: Vec<E>,
}

pub struct Registry<E: Entity> {
    buckets: RwLock<Vec<OriginBucket<E>>>,
    events: Arc<EventBus>,
    hook: OnceLock<Weak<dyn UpdateHook>>,
}

impl<E: Entity> Registry<E> {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            buckets: RwLock::new(Vec::new()),
            events,
            hook: OnceLock::new(),
        }
    }

    /// Connect the registry to whatever pushes updates to the client.
    /// Only the first hook is kept.
    pub fn set_update_hook(&self, hook: Weak<dyn UpdateHook>) {
        if self.hook.set(hook).is_err() {
            debug!("{} registry already has an update hook", E::KIND);
        }
    }

    /// Register `entity`, replacing any entity with the same origin and key.
    pub fn register(&self, entity: E) -> NbResult<()> {
        self.register_with(entity, false)
    }

    /// Register `entity`; with `skip_update` no client push is triggered.
    pub fn register_with(&self, entity: E, skip_update: bool) -> NbResult<()> {
        if entity.origin().is_empty() || entity.key().is_empty() {
            return Err(NbError::InvalidEntity {
                kind: E::KIND,
                reason: format!(
                    "origin and key are required (got {:?} | {:?})",
                    entity.origin(),
                    entity.key()
                ),
            });
        }

        let payload = entity.event_payload();
        {
            let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
            let index = match buckets.iter().position(|b| b.origin == entity.origin()) {
                Some(index) => index,
                None => {
                    buckets.push(OriginBucket {
                        origin: entity.origin().to_string(),
                        items: Vec::new(),
                    });
                    buckets.len() - 1
                }
            };
            let bucket = &mut buckets[index];
            debug!("Registering {}: {} | {}", E::KIND, entity.origin(), entity.key());
            match bucket.items.iter_mut().find(|e| e.key() == entity.key()) {
                Some(existing) => *existing = entity,
                None => bucket.items.push(entity),
            }
        }

        self.events.dispatch(E::REGISTER_EVENT, payload);
        if !skip_update {
            self.notify_changed();
        }
        Ok(())
    }

    /// Register every entity, then trigger a single client push.
    ///
    /// Stops at the first invalid entity. Entities registered before it stay
    /// registered, and the push still happens for them.
    pub fn register_all<I>(&self, entities: I) -> NbResult<usize>
    where
        I: IntoIterator<Item = E>,
    {
        let mut count = 0;
        let mut outcome = Ok(());
        for entity in entities {
            if let Err(e) = self.register_with(entity, true) {
                outcome = Err(e);
                break;
            }
            count += 1;
        }
        if count > 0 {
            info!("Registered {} {} entries", count, E::KIND);
            self.notify_changed();
        }
        outcome.map(|()| count)
    }

    /// Remove an entity. Absent keys are logged, not reported as errors.
    pub fn unregister(&self, origin: &str, key: &str) -> Option<E> {
        let removed = {
            let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
            let index = buckets.iter().position(|b| b.origin == origin);
            let removed = index.and_then(|i| {
                let items = &mut buckets[i].items;
                items
                    .iter()
                    .position(|e| e.key() == key)
                    .map(|pos| items.remove(pos))
            });
            if let Some(i) = index {
                if buckets[i].items.is_empty() {
                    buckets.remove(i);
                }
            }
            removed
        };

        match removed {
            Some(entity) => {
                debug!("Unregistered {}: {} | {}", E::KIND, origin, key);
                self.notify_changed();
                Some(entity)
            }
            None => {
                warn!("Cannot find {} to unregister: {} | {}", E::KIND, origin, key);
                None
            }
        }
    }

    pub fn exists(&self, origin: &str, key: &str) -> bool {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|b| b.origin == origin)
            .is_some_and(|b| b.items.iter().any(|e| e.key() == key))
    }

    pub fn get(&self, origin: &str, key: &str) -> Option<E> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|b| b.origin == origin)
            .and_then(|b| b.items.iter().find(|e| e.key() == key).cloned())
    }

    /// Like [`Registry::get`], but absent keys are an error.
    pub fn require(&self, origin: &str, key: &str) -> NbResult<E> {
        self.get(origin, key).ok_or_else(|| NbError::NotFound {
            kind: E::KIND,
            origin: origin.to_string(),
            key: key.to_string(),
        })
    }

    /// Every entity, in origin then key insertion order.
    pub fn list(&self) -> Vec<E> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|b| b.items.iter().cloned())
            .collect()
    }

    pub fn filter(&self, filter: &Filter) -> Vec<E> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|b| b.items.iter())
            .filter(|e| filter.matches(*e))
            .cloned()
            .collect()
    }

    pub fn origins(&self) -> Vec<String> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|b| b.origin.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|b| b.items.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_changed(&self) {
        if let Some(hook) = self.hook.get().and_then(Weak::upgrade) {
            hook.registry_changed();
        }
    }
}

impl Registry<Data> {
    /// All data registered under `origin` in `group`.
    pub fn group(&self, origin: &str, group: &str) -> Vec<Data> {
        self.filter(&Filter::new().origin(origin).equals("group", group))
    }

    /// `origin -> (label -> uri)` for data matching any of `kinds` and any
    /// of `origins`. `None` accepts everything. Origins without hits are
    /// left out.
    pub fn by_origin(
        &self,
        kinds: Option<&[&str]>,
        origins: Option<&[&str]>,
    ) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut matching: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for data in self.list() {
            if origins.is_some_and(|o| !o.contains(&data.origin.as_str())) {
                continue;
            }
            if let Some(kinds) = kinds {
                match &data.kind {
                    Some(kind) if kinds.contains(&kind.as_str()) => {}
                    _ => continue,
                }
            }
            matching
                .entry(data.origin.clone())
                .or_default()
                .insert(data.label.clone(), data.uri.clone());
        }
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbt_types::entity::TOOL_REGISTER_EVENT;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingHook(AtomicUsize);

    impl UpdateHook for CountingHook {
        fn registry_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tools_with_hook() -> (ToolRegistry, Arc<CountingHook>) {
        let registry = ToolRegistry::new(Arc::new(EventBus::new()));
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let weak: Weak<dyn UpdateHook> = Arc::downgrade(&hook) as Weak<dyn UpdateHook>;
        registry.set_update_hook(weak);
        (registry, hook)
    }

    #[test]
    fn last_write_wins() {
        let (registry, _) = tools_with_hook();
        registry.register(Tool::new("Notebook", "plot").with_name("Old")).unwrap();
        registry.register(Tool::new("Notebook", "plot").with_name("New")).unwrap();

        let tool = registry.get("Notebook", "plot").unwrap();
        assert_eq!(tool.name.as_deref(), Some("New"));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn missing_identity_is_rejected() {
        let (registry, hook) = tools_with_hook();
        let err = registry.register(Tool::new("", "plot")).unwrap_err();
        assert!(matches!(err, NbError::InvalidEntity { kind: "tool", .. }));
        assert!(registry.register(Tool::new("Notebook", "")).is_err());
        assert!(registry.is_empty());
        assert_eq!(hook.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unregister_twice_is_harmless() {
        let (registry, _) = tools_with_hook();
        registry.register(Tool::new("Notebook", "plot")).unwrap();
        assert!(registry.unregister("Notebook", "plot").is_some());
        assert!(registry.unregister("Notebook", "plot").is_none());
        assert!(!registry.exists("Notebook", "plot"));
        assert!(registry.origins().is_empty());
    }

    #[test]
    fn exists_on_missing_origin_is_false() {
        let (registry, _) = tools_with_hook();
        assert!(!registry.exists("Nowhere", "plot"));
        assert!(registry.get("Nowhere", "plot").is_none());
        assert!(matches!(
            registry.require("Nowhere", "plot"),
            Err(NbError::NotFound { .. })
        ));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let (registry, _) = tools_with_hook();
        registry.register(Tool::new("b", "2")).unwrap();
        registry.register(Tool::new("a", "1")).unwrap();
        registry.register(Tool::new("b", "1")).unwrap();
        registry.register(Tool::new("b", "2").with_name("again")).unwrap();

        let keys: Vec<(String, String)> = registry
            .list()
            .into_iter()
            .map(|t| (t.origin, t.id))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("b".to_string(), "2".to_string()),
                ("b".to_string(), "1".to_string()),
                ("a".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn register_all_notifies_once() {
        let (registry, hook) = tools_with_hook();
        let count = registry
            .register_all(vec![
                Tool::new("lib", "a"),
                Tool::new("lib", "b"),
                Tool::new("lib", "c"),
            ])
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_all_keeps_partial_batch() {
        let (registry, hook) = tools_with_hook();
        let result = registry.register_all(vec![
            Tool::new("lib", "a"),
            Tool::new("lib", ""),
            Tool::new("lib", "c"),
        ]);
        assert!(result.is_err());
        assert!(registry.exists("lib", "a"));
        assert!(!registry.exists("lib", "c"));
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_dispatches_event_after_write() {
        let events = Arc::new(EventBus::new());
        let registry = Arc::new(ToolRegistry::new(events.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let registry = Arc::downgrade(&registry);
            let seen = seen.clone();
            events.register(TOOL_REGISTER_EVENT, move |data| {
                let origin = data["origin"].as_str().unwrap_or_default();
                let id = data["id"].as_str().unwrap_or_default();
                let visible = registry.upgrade().is_some_and(|r| r.exists(origin, id));
                seen.lock().unwrap().push((id.to_string(), visible));
                Ok(())
            });
        }
        registry.register(Tool::new("Notebook", "plot")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![("plot".to_string(), true)]);
    }

    #[test]
    fn data_filter_and_grouping() {
        let registry = DataRegistry::new(Arc::new(EventBus::new()));
        registry
            .register_all(vec![
                Data::new("demo", "Step 1", "out.txt").with_kind("text"),
                Data::new("demo", "Step 1", "out2.txt").with_kind("text"),
                Data::new("demo", "Step 2", "plot.png"),
                Data::new("other", "Run", "https://example.org/a.txt").with_kind("text"),
            ])
            .unwrap();

        let text = registry.filter(&Filter::new().origin("demo").kinds(["text"]));
        assert_eq!(text.len(), 2);
        assert!(text.iter().all(|d| d.group == "Step 1"));

        assert_eq!(registry.group("demo", "Step 2").len(), 1);

        let grouped = registry.by_origin(Some(&["text"][..]), None);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["other"]["a.txt"], "https://example.org/a.txt");

        let only_demo = registry.by_origin(None, Some(&["demo"][..]));
        assert_eq!(only_demo["demo"].len(), 3);
        assert!(!only_demo.contains_key("other"));
    }
}
