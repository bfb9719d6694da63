//! Application-facing callback interface

use crate::services::{Pid, SurfaceId};

/// Callbacks an application implements to follow its window and surface.
///
/// Every method has an empty default, so implementors only override what they
/// care about. Callbacks can be invoked from any service dispatch thread.
pub trait AppBridgeDelegate: Send + Sync {
    fn on_active(&self) {}
    fn on_inactive(&self) {}
    fn on_visible(&self) {}
    fn on_invisible(&self) {}

    /// Called after the bridge has already ended the draw cycle for its role
    fn on_sync_draw(&self) {}

    fn on_flush_draw(&self) {}

    /// The home screen tapped this application's shortcut
    fn on_tap_shortcut(&self) {}

    /// Serialized JSON payload of an on-screen message
    fn on_screen_message(&self, _message: &str) {}

    fn on_surface_created(&self, _id: SurfaceId, _pid: Pid) {}

    /// `pid` is the owner recorded when the surface was created, or `None`
    /// when it could not be resolved at all.
    fn on_surface_destroyed(&self, _id: SurfaceId, _pid: Option<Pid>) {}

    /// Which process the application is waiting to bind a surface for.
    ///
    /// Asked once per created surface. Returning `None` means no surface is
    /// expected, and nothing gets bound.
    fn on_requested_surface_id(&self, _id: SurfaceId) -> Option<Pid> {
        None
    }
}
