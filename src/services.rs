//! Contracts for the three platform services the bridge sits on top of
//!
//! - `SurfaceController`: the layer/surface controller of the compositor. It
//!   reports surface and layer lifecycle and knows which process owns a surface.
//! - `WindowManagerClient`: a session with the window manager, used to bind a
//!   role to a surface and to activate it.
//! - `HomeScreenClient`: a session with the home screen, which sends shortcut
//!   taps and on-screen messages.
//!
//! The bridge never implements these; the host hands them in through
//! [`Services`]. All methods take `&self` because handlers and sinks run on
//! whatever thread the service dispatches from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::ServiceError;

#[cfg(test)]
use mockall::automock;

/// Compositor-assigned surface (or layer) id
pub type SurfaceId = u32;

/// Process id as reported by the compositor
pub type Pid = i32;

/// Default full-screen display area
pub const AREA_NORMAL_FULL: &str = "normal.full";

/// Kind of compositor object a lifecycle notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Surface,
    Layer,
}

/// One lifecycle notification from the surface controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleNotification {
    pub kind: ObjectKind,
    pub id: SurfaceId,
    /// `true` on creation, `false` on destruction
    pub created: bool,
}

impl LifecycleNotification {
    pub fn surface(id: SurfaceId, created: bool) -> Self {
        Self { kind: ObjectKind::Surface, id, created }
    }

    pub fn layer(id: SurfaceId, created: bool) -> Self {
        Self { kind: ObjectKind::Layer, id, created }
    }
}

/// Window manager event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmEvent {
    Active,
    Inactive,
    Visible,
    Invisible,
    SyncDraw,
    FlushDraw,
}

impl WmEvent {
    pub const ALL: [WmEvent; 6] = [
        WmEvent::Active,
        WmEvent::Inactive,
        WmEvent::Visible,
        WmEvent::Invisible,
        WmEvent::SyncDraw,
        WmEvent::FlushDraw,
    ];
}

impl fmt::Display for WmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WmEvent::Active => "Event_Active",
            WmEvent::Inactive => "Event_Inactive",
            WmEvent::Visible => "Event_Visible",
            WmEvent::Invisible => "Event_Invisible",
            WmEvent::SyncDraw => "Event_SyncDraw",
            WmEvent::FlushDraw => "Event_FlushDraw",
        };
        f.write_str(name)
    }
}

/// Home screen event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HsEvent {
    TapShortcut,
    OnScreenMessage,
}

impl HsEvent {
    pub const ALL: [HsEvent; 2] = [HsEvent::TapShortcut, HsEvent::OnScreenMessage];
}

impl fmt::Display for HsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HsEvent::TapShortcut => "Event_TapShortcut",
            HsEvent::OnScreenMessage => "Event_OnScreenMessage",
        };
        f.write_str(name)
    }
}

/// Handler for a window manager or home screen event; receives the raw payload
pub type EventHandler = Box<dyn Fn(&Value) + Send + Sync>;

/// Receiver for surface controller lifecycle notifications
pub type NotificationSink = Arc<dyn Fn(LifecycleNotification) + Send + Sync>;

/// Layer/surface controller of the compositor
#[cfg_attr(test, automock)]
pub trait SurfaceController: Send + Sync {
    fn init(&self) -> Result<(), ServiceError>;

    /// Install the single lifecycle sink. Notifications may arrive on any thread.
    fn register_notification_sink(&self, sink: NotificationSink) -> Result<(), ServiceError>;

    fn unregister_notification_sink(&self) -> Result<(), ServiceError>;

    /// Release the controller connection
    fn shutdown(&self) -> Result<(), ServiceError>;

    /// Look up the process that created a surface
    fn surface_owner(&self, id: SurfaceId) -> Result<Pid, ServiceError>;
}

/// Session with the window manager
#[cfg_attr(test, automock)]
pub trait WindowManagerClient: Send + Sync {
    fn init(&self, port: u16, token: &str) -> Result<(), ServiceError>;

    fn set_event_handler(&self, event: WmEvent, handler: EventHandler);

    /// Bind `role` to an xdg surface id
    fn request_surface_xdg(&self, role: &str, id: SurfaceId);

    fn activate_window(&self, role: &str, area: &str);

    fn end_draw(&self, role: &str);

    fn close(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Session with the home screen
#[cfg_attr(test, automock)]
pub trait HomeScreenClient: Send + Sync {
    fn init(&self, port: u16, token: &str) -> Result<(), ServiceError>;

    fn set_event_handler(&self, event: HsEvent, handler: EventHandler);

    fn close(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// The collaborators a bridge is built from. The bridge takes ownership.
pub struct Services {
    pub controller: Box<dyn SurfaceController>,
    pub window_manager: Box<dyn WindowManagerClient>,
    pub home_screen: Box<dyn HomeScreenClient>,
}
