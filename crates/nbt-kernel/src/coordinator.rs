//! Debounced registry pushes.
//!
//! A burst of registrations collapses into one push per cool-off window.
//! Every push recomputes the snapshot from the live registries, so a
//! coalesced push never loses a change; it can only arrive later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;

use nbt_types::comm::{KernelMessage, UpdatePayload};

use crate::comm::SyncChannel;
use crate::registry::{DataRegistry, ToolRegistry, UpdateHook};
use crate::widgets::WidgetCache;

#[derive(Debug, Default)]
struct UpdateState {
    last_update: Option<Instant>,
    update_queued: bool,
    /// Bumped per queued push; a timer only fires for its own generation.
    generation: u64,
    pushes: u64,
}

impl UpdateState {
    fn is_stale(&self, window: Duration) -> bool {
        self.last_update.map_or(true, |at| at.elapsed() > window)
    }

    /// Claim a push. Any queued push is subsumed, since snapshots are live.
    fn record_push(&mut self) {
        self.last_update = Some(Instant::now());
        self.update_queued = false;
        self.pushes += 1;
    }
}

pub struct UpdateCoordinator {
    tools: Arc<ToolRegistry>,
    data: Arc<DataRegistry>,
    widgets: Arc<WidgetCache>,
    channel: Arc<SyncChannel>,
    imported: AtomicBool,
    window: Duration,
    state: Mutex<UpdateState>,
    runtime: Handle,
    this: Weak<UpdateCoordinator>,
}

impl UpdateCoordinator {
    pub fn new(
        tools: Arc<ToolRegistry>,
        data: Arc<DataRegistry>,
        widgets: Arc<WidgetCache>,
        channel: Arc<SyncChannel>,
        window: Duration,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            tools,
            data,
            widgets,
            channel,
            imported: AtomicBool::new(false),
            window,
            state: Mutex::new(UpdateState::default()),
            runtime,
            this: this.clone(),
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_imported(&self, imported: bool) {
        self.imported.store(imported, Ordering::SeqCst);
    }

    pub fn is_imported(&self) -> bool {
        self.imported.load(Ordering::SeqCst)
    }

    /// Current registry contents in wire form.
    pub fn snapshot(&self) -> UpdatePayload {
        UpdatePayload {
            imported: self.is_imported(),
            tools: self.tools.list().iter().map(|t| t.json_safe()).collect(),
            data: self
                .data
                .list()
                .iter()
                .map(|d| d.json_safe(self.widgets.has_data_widget(&d.origin, &d.uri)))
                .collect(),
        }
    }

    /// Push the current snapshot immediately. A pending queued push is
    /// dropped.
    pub fn send_update(&self) {
        self.lock_state().record_push();
        self.push();
    }

    /// Schedule one push after the cool-off window. No-op while a push is
    /// already pending.
    pub fn queue_update(&self) {
        let mut state = self.lock_state();
        self.schedule(&mut state);
    }

    /// Whether more than the cool-off window has passed since the last push.
    pub fn update_stale(&self) -> bool {
        self.lock_state().is_stale(self.window)
    }

    pub fn update_queued(&self) -> bool {
        self.lock_state().update_queued
    }

    /// Number of pushes issued so far.
    pub fn pushes(&self) -> u64 {
        self.lock_state().pushes
    }

    fn lock_state(&self) -> MutexGuard<'_, UpdateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self, state: &mut UpdateState) {
        if state.update_queued {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        state.update_queued = true;
        state.generation += 1;
        let generation = state.generation;
        let window = self.window;
        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            {
                let mut state = this.lock_state();
                if !state.update_queued || state.generation != generation {
                    return;
                }
                state.record_push();
            }
            this.push();
        });
    }

    fn push(&self) {
        let payload = self.snapshot();
        debug!(
            "Pushing update: {} tools, {} data",
            payload.tools.len(),
            payload.data.len()
        );
        self.channel.send_message(KernelMessage::Update(payload));
    }
}

impl UpdateHook for UpdateCoordinator {
    fn registry_changed(&self) {
        {
            let mut state = self.lock_state();
            if state.update_queued || !state.is_stale(self.window) {
                self.schedule(&mut state);
                return;
            }
            state.record_push();
        }
        self.push();
    }
}
