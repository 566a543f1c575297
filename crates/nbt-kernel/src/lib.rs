pub mod comm;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod manifest;
pub mod placeholder;
pub mod registry;
pub mod usage;
pub mod widgets;

pub use comm::{ChannelTransport, CommTransport, NdjsonTransport, SyncChannel};
pub use coordinator::UpdateCoordinator;
pub use events::EventBus;
pub use placeholder::{AwaitedKey, Placeholder, PlaceholderResolver, PlaceholderState};
pub use registry::{DataRegistry, ToolRegistry, UpdateHook};
pub use widgets::{WidgetCache, WidgetSlot};

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};

use nbt_types::comm::{ClientMessage, KernelMessage, NotificationPayload};
use nbt_types::config::NbConfig;
use nbt_types::{LoadArgs, LoadError, Widget};

use usage::{UsageEvent, UsageReporter};

/// Outcome of resolving a tool or data reference.
#[derive(Debug)]
pub enum Resolution {
    /// The reference exists; this is its widget.
    Ready(Widget),
    /// Not registered yet; the placeholder swaps itself out when it is.
    Pending(Placeholder),
}

impl Resolution {
    /// Whatever should be displayed right now.
    pub fn display(&self) -> Widget {
        match self {
            Self::Ready(widget) => widget.clone(),
            Self::Pending(placeholder) => placeholder.display(),
        }
    }
}

/// Kernel-side application context: owns every service of one session.
///
/// Services are built in dependency order: event bus, registries, widget
/// cache, sync channel, update coordinator, placeholder resolver.
pub struct Kernel {
    config: NbConfig,
    events: Arc<EventBus>,
    tools: Arc<ToolRegistry>,
    data: Arc<DataRegistry>,
    widgets: Arc<WidgetCache>,
    channel: Arc<SyncChannel>,
    coordinator: Arc<UpdateCoordinator>,
    placeholders: PlaceholderResolver,
    usage: UsageReporter,
}

impl Kernel {
    /// Build a kernel. Must be called from within a tokio runtime.
    pub fn new(config: NbConfig) -> Result<Self> {
        let runtime = Handle::try_current().context("Kernel requires a tokio runtime")?;

        let events = Arc::new(EventBus::new());
        let tools = Arc::new(ToolRegistry::new(events.clone()));
        let data = Arc::new(DataRegistry::new(events.clone()));
        let widgets = Arc::new(WidgetCache::new(events.clone()));
        let channel = Arc::new(SyncChannel::new(
            config.sync.comm_name.clone(),
            runtime.clone(),
        ));
        let coordinator = UpdateCoordinator::new(
            tools.clone(),
            data.clone(),
            widgets.clone(),
            channel.clone(),
            Duration::from_millis(config.sync.debounce_ms),
            runtime.clone(),
        );
        let hook: Weak<dyn UpdateHook> = Arc::downgrade(&coordinator) as Weak<dyn UpdateHook>;
        tools.set_update_hook(hook.clone());
        data.set_update_hook(hook);

        let placeholders =
            PlaceholderResolver::new(events.clone(), tools.clone(), data.clone(), widgets.clone());
        let usage = UsageReporter::new(&config.usage, runtime);

        info!("Kernel ready (comm: {})", config.sync.comm_name);
        Ok(Self {
            config,
            events,
            tools,
            data,
            widgets,
            channel,
            coordinator,
            placeholders,
            usage,
        })
    }

    pub fn config(&self) -> &NbConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn data(&self) -> &Arc<DataRegistry> {
        &self.data
    }

    pub fn widgets(&self) -> &Arc<WidgetCache> {
        &self.widgets
    }

    pub fn channel(&self) -> &Arc<SyncChannel> {
        &self.channel
    }

    pub fn coordinator(&self) -> &Arc<UpdateCoordinator> {
        &self.coordinator
    }

    pub fn placeholders(&self) -> &PlaceholderResolver {
        &self.placeholders
    }

    // ─── Front-end connection ─────────────────────────────────────────────────

    pub fn attach(&self, transport: Arc<dyn CommTransport>) {
        self.channel.attach(transport);
    }

    pub fn detach(&self) {
        self.channel.detach();
    }

    /// Route one raw inbound comm message.
    pub fn handle_client_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(message) = self.channel.decode(line) {
            self.handle_client_message(message);
        }
    }

    pub fn handle_client_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::RequestUpdate => self.coordinator.send_update(),
        }
    }

    /// Show a notification in the front-end.
    pub fn notify(&self, message: impl Into<String>, sender: Option<String>) {
        self.channel
            .send_message(KernelMessage::Notification(NotificationPayload {
                message: message.into(),
                sender,
            }));
    }

    // ─── Resolution ───────────────────────────────────────────────────────────

    /// Look up a tool and load it with `args`. Unknown tools yield a
    /// placeholder that resolves once the tool is registered.
    pub fn tool(&self, id: &str, origin: &str, args: LoadArgs) -> Result<Resolution, LoadError> {
        match self.tools.get(origin, id) {
            Some(tool) => {
                let widget = tool.load(&args)?;
                let _ = self.usage.ping(UsageEvent::tool_loaded(origin, id));
                Ok(Resolution::Ready(widget))
            }
            None => {
                warn!("Cannot find tool: {} | {}", origin, id);
                Ok(Resolution::Pending(
                    self.placeholders.placeholder(AwaitedKey::tool(origin, id), args),
                ))
            }
        }
    }

    /// Widget for one datum: the cached one if any, else a fresh data widget.
    pub fn data_widget(&self, origin: &str, uri: &str) -> Resolution {
        if let Some(widget) = self.widgets.data_widget(origin, uri) {
            return Resolution::Ready(widget);
        }
        match self.data.get(origin, uri) {
            Some(data) => Resolution::Ready(Widget::for_data(&data)),
            None => {
                warn!("Cannot find data: {} | {}", origin, uri);
                Resolution::Pending(
                    self.placeholders
                        .placeholder(AwaitedKey::data(origin, uri), LoadArgs::new()),
                )
            }
        }
    }

    /// Widget for a data group: the cached one if any, else a listing of
    /// the group's registered data.
    pub fn group_widget(&self, origin: &str, group: &str) -> Resolution {
        if let Some(widget) = self.widgets.group_widget(origin, group) {
            return Resolution::Ready(widget);
        }
        let items = self.data.group(origin, group);
        if !items.is_empty() {
            return Resolution::Ready(Widget::group(origin, group, &items));
        }
        warn!("Cannot find data group: {} | {}", origin, group);
        Resolution::Pending(
            self.placeholders
                .placeholder(AwaitedKey::group(origin, group), LoadArgs::new()),
        )
    }
}
