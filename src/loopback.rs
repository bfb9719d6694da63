//! In-process platform services
//!
//! `LoopbackPlatform` implements the surface controller, window manager and
//! home screen contracts over one shared in-memory state. A driver creates and
//! destroys surfaces, emits events, and inspects the calls the bridge made.
//! Any setup or release step can be made to fail with [`FailPoint`].
//!
//! ```no_run
//! use appbridge::loopback::{LoopbackPlatform, PlatformCall};
//!
//! let platform = LoopbackPlatform::new();
//! let services = platform.services();
//! // ... connect a SurfaceBridge with `services` ...
//! platform.create_surface(7, 1234);
//! assert!(platform.calls().contains(&PlatformCall::RequestSurfaceXdg {
//!     role: "mediaplayer".into(),
//!     id: 7,
//! }));
//! ```

use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::services::{
    EventHandler, HomeScreenClient, HsEvent, LifecycleNotification, NotificationSink, Pid,
    Services, SurfaceController, SurfaceId, WindowManagerClient, WmEvent,
};

/// Status returned by an injected failure
pub const INJECTED_FAILURE_STATUS: i32 = -1;

/// A call the bridge made into one of the services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PlatformCall {
    ControllerInit,
    RegisterSink,
    UnregisterSink,
    ControllerShutdown,
    WindowManagerInit { port: u16, token: String },
    WindowManagerHandler { event: WmEvent },
    RequestSurfaceXdg { role: String, id: SurfaceId },
    ActivateWindow { role: String, area: String },
    EndDraw { role: String },
    WindowManagerClose,
    HomeScreenInit { port: u16, token: String },
    HomeScreenHandler { event: HsEvent },
    HomeScreenClose,
}

/// Steps that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ControllerInit,
    RegisterSink,
    UnregisterSink,
    ControllerShutdown,
    WindowManagerInit,
    WindowManagerClose,
    HomeScreenInit,
    HomeScreenClose,
}

type SharedHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct LoopbackState {
    calls: Vec<PlatformCall>,
    failures: HashSet<FailPoint>,
    surfaces: HashMap<SurfaceId, Pid>,
    sink: Option<NotificationSink>,
    wm_handlers: HashMap<WmEvent, SharedHandler>,
    hs_handlers: HashMap<HsEvent, SharedHandler>,
}

impl LoopbackState {
    fn record(&mut self, call: PlatformCall, point: Option<FailPoint>) -> Result<(), ServiceError> {
        self.calls.push(call);
        match point {
            Some(point) if self.failures.contains(&point) => {
                Err(ServiceError::Status(INJECTED_FAILURE_STATUS))
            }
            _ => Ok(()),
        }
    }
}

/// Shared handle on the in-memory platform. Clones see the same state.
#[derive(Clone, Default)]
pub struct LoopbackPlatform {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `point` fail from now on
    pub fn fail_at(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    /// Boxed service handles for `SurfaceBridge::connect`
    pub fn services(&self) -> Services {
        Services {
            controller: Box::new(LoopbackController { state: self.state.clone() }),
            window_manager: Box::new(LoopbackWindowManager { state: self.state.clone() }),
            home_screen: Box::new(LoopbackHomeScreen { state: self.state.clone() }),
        }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// `(role, surface id)` of every binding request
    pub fn bindings(&self) -> Vec<(String, SurfaceId)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::RequestSurfaceXdg { role, id } => Some((role.clone(), *id)),
                _ => None,
            })
            .collect()
    }

    /// `(role, area)` of every activation request
    pub fn activations(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::ActivateWindow { role, area } => Some((role.clone(), area.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn has_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn surface_count(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    /// Add a surface owned by `pid` and notify the sink
    pub fn create_surface(&self, id: SurfaceId, pid: Pid) {
        self.state.lock().surfaces.insert(id, pid);
        self.deliver(LifecycleNotification::surface(id, true));
    }

    /// Remove a surface, then notify the sink. Its owner is no longer queryable.
    pub fn destroy_surface(&self, id: SurfaceId) {
        self.state.lock().surfaces.remove(&id);
        self.deliver(LifecycleNotification::surface(id, false));
    }

    pub fn create_layer(&self, id: SurfaceId) {
        self.deliver(LifecycleNotification::layer(id, true));
    }

    pub fn destroy_layer(&self, id: SurfaceId) {
        self.deliver(LifecycleNotification::layer(id, false));
    }

    /// Invoke the window manager handler for `event`. Returns false if none is set.
    pub fn emit_window_manager(&self, event: WmEvent, payload: &Value) -> bool {
        let handler = self.state.lock().wm_handlers.get(&event).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Invoke the home screen handler for `event`. Returns false if none is set.
    pub fn emit_home_screen(&self, event: HsEvent, payload: &Value) -> bool {
        let handler = self.state.lock().hs_handlers.get(&event).cloned();
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    fn deliver(&self, notification: LifecycleNotification) {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink(notification),
            None => debug!("No sink registered, dropping {:?}", notification),
        }
    }
}

struct LoopbackController {
    state: Arc<Mutex<LoopbackState>>,
}

impl SurfaceController for LoopbackController {
    fn init(&self) -> Result<(), ServiceError> {
        self.state
            .lock()
            .record(PlatformCall::ControllerInit, Some(FailPoint::ControllerInit))
    }

    fn register_notification_sink(&self, sink: NotificationSink) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record(PlatformCall::RegisterSink, Some(FailPoint::RegisterSink))?;
        state.sink = Some(sink);
        Ok(())
    }

    fn unregister_notification_sink(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock();
        state.record(PlatformCall::UnregisterSink, Some(FailPoint::UnregisterSink))?;
        state.sink = None;
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ServiceError> {
        self.state
            .lock()
            .record(PlatformCall::ControllerShutdown, Some(FailPoint::ControllerShutdown))
    }

    fn surface_owner(&self, id: SurfaceId) -> Result<Pid, ServiceError> {
        self.state
            .lock()
            .surfaces
            .get(&id)
            .copied()
            .ok_or(ServiceError::UnknownSurface(id))
    }
}

struct LoopbackWindowManager {
    state: Arc<Mutex<LoopbackState>>,
}

impl WindowManagerClient for LoopbackWindowManager {
    fn init(&self, port: u16, token: &str) -> Result<(), ServiceError> {
        let call = PlatformCall::WindowManagerInit { port, token: token.to_string() };
        self.state.lock().record(call, Some(FailPoint::WindowManagerInit))
    }

    fn set_event_handler(&self, event: WmEvent, handler: EventHandler) {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::WindowManagerHandler { event });
        state.wm_handlers.insert(event, Arc::from(handler));
    }

    fn request_surface_xdg(&self, role: &str, id: SurfaceId) {
        self.state
            .lock()
            .calls
            .push(PlatformCall::RequestSurfaceXdg { role: role.to_string(), id });
    }

    fn activate_window(&self, role: &str, area: &str) {
        self.state.lock().calls.push(PlatformCall::ActivateWindow {
            role: role.to_string(),
            area: area.to_string(),
        });
    }

    fn end_draw(&self, role: &str) {
        self.state
            .lock()
            .calls
            .push(PlatformCall::EndDraw { role: role.to_string() });
    }

    fn close(&self) -> Result<(), ServiceError> {
        self.state
            .lock()
            .record(PlatformCall::WindowManagerClose, Some(FailPoint::WindowManagerClose))
    }
}

struct LoopbackHomeScreen {
    state: Arc<Mutex<LoopbackState>>,
}

impl HomeScreenClient for LoopbackHomeScreen {
    fn init(&self, port: u16, token: &str) -> Result<(), ServiceError> {
        let call = PlatformCall::HomeScreenInit { port, token: token.to_string() };
        self.state.lock().record(call, Some(FailPoint::HomeScreenInit))
    }

    fn set_event_handler(&self, event: HsEvent, handler: EventHandler) {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::HomeScreenHandler { event });
        state.hs_handlers.insert(event, Arc::from(handler));
    }

    fn close(&self) -> Result<(), ServiceError> {
        self.state
            .lock()
            .record(PlatformCall::HomeScreenClose, Some(FailPoint::HomeScreenClose))
    }
}
