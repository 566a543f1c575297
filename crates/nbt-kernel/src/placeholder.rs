//! Placeholders for tool/data references that are not registered yet.
//!
//! A placeholder shows an error widget right away and listens for
//! registrations. The first registration matching its full key swaps the
//! real widget into its display slot and retires the subscriptions.
//! Dropping a placeholder that is still pending retires them too; a
//! `DisplaySlot` taken from it stops updating at that point.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, info};

use nbt_types::entity::{DATA_REGISTER_EVENT, REFRESH_DATA_EVENT, TOOL_REGISTER_EVENT};
use nbt_types::{LoadArgs, Widget};

use crate::events::{EventBus, SubscriberId};
use crate::registry::{DataRegistry, ToolRegistry};
use crate::widgets::WidgetCache;

/// The composite key a placeholder is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AwaitedKey {
    Tool { origin: String, id: String },
    Data { origin: String, uri: String },
    Group { origin: String, group: String },
}

impl AwaitedKey {
    pub fn tool(origin: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Tool {
            origin: origin.into(),
            id: id.into(),
        }
    }

    pub fn data(origin: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::Data {
            origin: origin.into(),
            uri: uri.into(),
        }
    }

    pub fn group(origin: impl Into<String>, group: impl Into<String>) -> Self {
        Self::Group {
            origin: origin.into(),
            group: group.into(),
        }
    }

    fn origin(&self) -> &str {
        match self {
            Self::Tool { origin, .. } | Self::Data { origin, .. } | Self::Group { origin, .. } => {
                origin
            }
        }
    }

    fn events(&self) -> &'static [&'static str] {
        match self {
            Self::Tool { .. } => &[TOOL_REGISTER_EVENT],
            Self::Data { .. } | Self::Group { .. } => &[DATA_REGISTER_EVENT, REFRESH_DATA_EVENT],
        }
    }

    /// Match an event payload on the full key. Data keys compare the `id`
    /// field (the uri); group keys compare `group`.
    pub fn matches(&self, payload: &Value) -> bool {
        let field = |name: &str| payload.get(name).and_then(Value::as_str);
        if field("origin") != Some(self.origin()) {
            return false;
        }
        match self {
            Self::Tool { id, .. } => field("id") == Some(id.as_str()),
            Self::Data { uri, .. } => field("id") == Some(uri.as_str()),
            Self::Group { group, .. } => field("group") == Some(group.as_str()),
        }
    }

    fn not_found(&self) -> Widget {
        match self {
            Self::Tool { origin, id } => {
                Widget::placeholder("Cannot find tool", format!("Cannot find tool: {origin} | {id}"))
            }
            Self::Data { origin, uri } => {
                Widget::placeholder("Cannot find data", format!("Cannot find data: {origin} | {uri}"))
            }
            Self::Group { origin, group } => Widget::placeholder(
                "Cannot find data group",
                format!("Cannot find data group: {origin} | {group}"),
            ),
        }
    }
}

impl fmt::Display for AwaitedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool { origin, id } => write!(f, "tool {origin} | {id}"),
            Self::Data { origin, uri } => write!(f, "data {origin} | {uri}"),
            Self::Group { origin, group } => write!(f, "group {origin} | {group}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderState {
    Pending,
    Resolved,
}

/// What is currently displayed for a reference; replaced in place.
#[derive(Debug, Clone)]
pub struct DisplaySlot {
    widget: Arc<RwLock<Widget>>,
}

impl DisplaySlot {
    pub fn new(widget: Widget) -> Self {
        Self {
            widget: Arc::new(RwLock::new(widget)),
        }
    }

    pub fn current(&self) -> Widget {
        self.widget
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, widget: Widget) {
        *self.widget.write().unwrap_or_else(PoisonError::into_inner) = widget;
    }
}

type Subscriptions = Arc<Mutex<Vec<(&'static str, SubscriberId)>>>;

pub struct Placeholder {
    key: AwaitedKey,
    state: Arc<Mutex<PlaceholderState>>,
    slot: DisplaySlot,
    events: Weak<EventBus>,
    subscriptions: Subscriptions,
}

impl Placeholder {
    pub fn key(&self) -> &AwaitedKey {
        &self.key
    }

    pub fn state(&self) -> PlaceholderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == PlaceholderState::Resolved
    }

    /// The widget currently displayed: the error placeholder while pending,
    /// the real widget once resolved.
    pub fn display(&self) -> Widget {
        self.slot.current()
    }

    pub fn slot(&self) -> DisplaySlot {
        self.slot.clone()
    }
}

impl Drop for Placeholder {
    fn drop(&mut self) {
        retire(&self.events, &self.subscriptions);
    }
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placeholder")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

/// Lookup side of the resolver, shared with subscription callbacks.
#[derive(Clone)]
struct Lookup {
    tools: Arc<ToolRegistry>,
    data: Arc<DataRegistry>,
    widgets: Arc<WidgetCache>,
}

impl Lookup {
    /// The real widget for `key`, or `None` if it is still unavailable.
    fn resolve(&self, key: &AwaitedKey, args: &LoadArgs) -> anyhow::Result<Option<Widget>> {
        match key {
            AwaitedKey::Tool { origin, id } => match self.tools.get(origin, id) {
                Some(tool) => Ok(Some(tool.load(args)?)),
                None => Ok(None),
            },
            AwaitedKey::Data { origin, uri } => Ok(self
                .widgets
                .data_widget(origin, uri)
                .or_else(|| self.data.get(origin, uri).map(|d| Widget::for_data(&d)))),
            AwaitedKey::Group { origin, group } => {
                if let Some(widget) = self.widgets.group_widget(origin, group) {
                    return Ok(Some(widget));
                }
                let items = self.data.group(origin, group);
                Ok((!items.is_empty()).then(|| Widget::group(origin, group, &items)))
            }
        }
    }
}

#[derive(Clone)]
pub struct PlaceholderResolver {
    events: Arc<EventBus>,
    lookup: Lookup,
}

impl PlaceholderResolver {
    pub fn new(
        events: Arc<EventBus>,
        tools: Arc<ToolRegistry>,
        data: Arc<DataRegistry>,
        widgets: Arc<WidgetCache>,
    ) -> Self {
        Self {
            events,
            lookup: Lookup {
                tools,
                data,
                widgets,
            },
        }
    }

    /// Create a pending placeholder for `key`. `args` are used to load the
    /// tool once it shows up.
    pub fn placeholder(&self, key: AwaitedKey, args: LoadArgs) -> Placeholder {
        let state = Arc::new(Mutex::new(PlaceholderState::Pending));
        let slot = DisplaySlot::new(key.not_found());
        let subscriptions: Subscriptions = Arc::new(Mutex::new(Vec::new()));

        for event in key.events() {
            let callback = {
                let key = key.clone();
                let args = args.clone();
                let state = state.clone();
                let slot = slot.clone();
                let lookup = self.lookup.clone();
                let events = Arc::downgrade(&self.events);
                let subscriptions = subscriptions.clone();
                move |payload: &Value| -> anyhow::Result<()> {
                    if !key.matches(payload) {
                        return Ok(());
                    }
                    {
                        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                        if *state == PlaceholderState::Resolved {
                            return Ok(());
                        }
                        let Some(widget) = lookup.resolve(&key, &args)? else {
                            return Ok(());
                        };
                        *state = PlaceholderState::Resolved;
                        slot.replace(widget);
                    }
                    info!("Placeholder resolved: {}", key);
                    retire(&events, &subscriptions);
                    Ok(())
                }
            };
            let id = self.events.register(event, callback);
            subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((*event, id));
        }

        debug!("Placeholder pending: {}", key);
        Placeholder {
            key,
            state,
            slot,
            events: Arc::downgrade(&self.events),
            subscriptions,
        }
    }
}

fn retire(events: &Weak<EventBus>, subscriptions: &Subscriptions) {
    let Some(events) = events.upgrade() else {
        return;
    };
    let retired: Vec<_> = subscriptions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    for (event, id) in retired {
        events.unregister(event, id);
    }
}
