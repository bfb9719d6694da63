//! Scripted replay of platform events through a bridge
//!
//! A replay script is a TOML file naming the pid the application waits for and
//! a list of events:
//!
//! ```toml
//! requested_pid = 1234
//!
//! [[event]]
//! kind = "surface_created"
//! id = 7
//! pid = 1234
//!
//! [[event]]
//! kind = "window_manager"
//! event = "sync_draw"
//!
//! [[event]]
//! kind = "home_screen"
//! event = "on_screen_message"
//! payload = '{"k":"v"}'
//! ```
//!
//! [`run`] connects a `SurfaceBridge` to a [`LoopbackPlatform`], plays the
//! events in order, shuts the bridge down and reports what happened.

use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::bridge::SurfaceBridge;
use crate::config::BridgeConfig;
use crate::delegate::AppBridgeDelegate;
use crate::loopback::{LoopbackPlatform, PlatformCall};
use crate::services::{HsEvent, Pid, SurfaceId, WmEvent};

/// Events to play, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Answer to every `on_requested_surface_id` query
    #[serde(default)]
    pub requested_pid: Option<Pid>,

    #[serde(default, rename = "event")]
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptEvent {
    SurfaceCreated { id: SurfaceId, pid: Pid },
    SurfaceDestroyed { id: SurfaceId },
    LayerCreated { id: SurfaceId },
    LayerDestroyed { id: SurfaceId },
    WindowManager { event: WmEvent },
    HomeScreen {
        event: HsEvent,
        /// JSON text, `null` when absent
        #[serde(default)]
        payload: Option<String>,
    },
}

impl ReplayScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse replay script: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let script: ReplayScript = toml::from_str(contents)?;
        Ok(script)
    }
}

/// A delegate callback as seen by [`RecordingDelegate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum DelegateCall {
    Active,
    Inactive,
    Visible,
    Invisible,
    SyncDraw,
    FlushDraw,
    TapShortcut,
    ScreenMessage { message: String },
    SurfaceCreated { id: SurfaceId, pid: Pid },
    SurfaceDestroyed { id: SurfaceId, pid: Option<Pid> },
    RequestedSurfaceId { id: SurfaceId },
}

/// Delegate that logs and records every callback and answers the requested
/// pid query with a fixed value
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    requested_pid: Mutex<Option<Pid>>,
    calls: Mutex<Vec<DelegateCall>>,
}

impl RecordingDelegate {
    pub fn new(requested_pid: Option<Pid>) -> Self {
        Self {
            requested_pid: Mutex::new(requested_pid),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_requested_pid(&self, pid: Option<Pid>) {
        *self.requested_pid.lock() = pid;
    }

    pub fn calls(&self) -> Vec<DelegateCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: DelegateCall) {
        info!("📨 {:?}", call);
        self.calls.lock().push(call);
    }
}

impl AppBridgeDelegate for RecordingDelegate {
    fn on_active(&self) {
        self.record(DelegateCall::Active);
    }

    fn on_inactive(&self) {
        self.record(DelegateCall::Inactive);
    }

    fn on_visible(&self) {
        self.record(DelegateCall::Visible);
    }

    fn on_invisible(&self) {
        self.record(DelegateCall::Invisible);
    }

    fn on_sync_draw(&self) {
        self.record(DelegateCall::SyncDraw);
    }

    fn on_flush_draw(&self) {
        self.record(DelegateCall::FlushDraw);
    }

    fn on_tap_shortcut(&self) {
        self.record(DelegateCall::TapShortcut);
    }

    fn on_screen_message(&self, message: &str) {
        self.record(DelegateCall::ScreenMessage { message: message.to_string() });
    }

    fn on_surface_created(&self, id: SurfaceId, pid: Pid) {
        self.record(DelegateCall::SurfaceCreated { id, pid });
    }

    fn on_surface_destroyed(&self, id: SurfaceId, pid: Option<Pid>) {
        self.record(DelegateCall::SurfaceDestroyed { id, pid });
    }

    fn on_requested_surface_id(&self, id: SurfaceId) -> Option<Pid> {
        self.record(DelegateCall::RequestedSurfaceId { id });
        *self.requested_pid.lock()
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub platform_calls: Vec<PlatformCall>,
    pub delegate_calls: Vec<DelegateCall>,
    /// Whether the bridge was still waiting for its first surface at the end
    pub pending_create: bool,
}

/// Play `script` through a fresh bridge over a loopback platform
pub fn run(config: BridgeConfig, script: &ReplayScript) -> Result<ReplayReport> {
    let platform = LoopbackPlatform::new();
    let recorder = Arc::new(RecordingDelegate::new(script.requested_pid));
    let delegate: Arc<dyn AppBridgeDelegate> = recorder.clone();

    let bridge = SurfaceBridge::connect(config, Arc::downgrade(&delegate), platform.services())
        .context("Failed to connect app bridge")?;

    for (index, event) in script.events.iter().enumerate() {
        apply(&platform, event).with_context(|| format!("Replay event #{} failed", index + 1))?;
    }

    let pending_create = bridge.is_pending_create();
    bridge.shutdown().context("Failed to shut down app bridge")?;

    Ok(ReplayReport {
        platform_calls: platform.calls(),
        delegate_calls: recorder.calls(),
        pending_create,
    })
}

fn apply(platform: &LoopbackPlatform, event: &ScriptEvent) -> Result<()> {
    match event {
        ScriptEvent::SurfaceCreated { id, pid } => platform.create_surface(*id, *pid),
        ScriptEvent::SurfaceDestroyed { id } => platform.destroy_surface(*id),
        ScriptEvent::LayerCreated { id } => platform.create_layer(*id),
        ScriptEvent::LayerDestroyed { id } => platform.destroy_layer(*id),
        ScriptEvent::WindowManager { event } => {
            if !platform.emit_window_manager(*event, &Value::Null) {
                warn!("⚠️ No window manager handler for {}", event);
            }
        }
        ScriptEvent::HomeScreen { event, payload } => {
            let payload = match payload {
                Some(text) => serde_json::from_str(text)
                    .with_context(|| format!("Invalid JSON payload for {}: {}", event, text))?,
                None => Value::Null,
            };
            if !platform.emit_home_screen(*event, &payload) {
                warn!("⚠️ No home screen handler for {}", event);
            }
        }
    }
    Ok(())
}
