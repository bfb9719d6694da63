//! The surface bridge
//!
//! `SurfaceBridge` opens a window manager session, a home screen session and a
//! surface controller sink, then turns everything those services report into
//! `AppBridgeDelegate` callbacks. Its only real decision is which created
//! surface belongs to the application: the one whose owning process matches
//! what the delegate says it is waiting for. That surface gets bound to the
//! bridge's role, and the very first one is also activated, to make up for a
//! shortcut tap that arrived before the application had a window.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::config::BridgeConfig;
use crate::delegate::AppBridgeDelegate;
use crate::error::{BridgeError, TeardownError, TeardownStage};
use crate::services::{
    HomeScreenClient, HsEvent, LifecycleNotification, NotificationSink, ObjectKind, Pid,
    Services, SurfaceController, SurfaceId, WindowManagerClient, WmEvent,
};

/// Adapter between the platform services and one application delegate
pub struct SurfaceBridge {
    core: Arc<BridgeCore>,
    name: Option<String>,
    torn_down: bool,
}

/// State shared with the handlers registered on the services.
///
/// Handlers hold a `Weak` to this, so once the bridge is gone they do nothing.
struct BridgeCore {
    config: BridgeConfig,
    delegate: Weak<dyn AppBridgeDelegate>,

    controller: Box<dyn SurfaceController>,
    window_manager: Box<dyn WindowManagerClient>,
    home_screen: Box<dyn HomeScreenClient>,

    /// True until the first matching surface has been bound
    pending_create: Mutex<bool>,

    /// Owning pid of every bound surface, recorded at creation.
    /// Foreign surfaces are looked up live when destroyed.
    surface_owners: Mutex<HashMap<SurfaceId, Pid>>,
}

impl SurfaceBridge {
    /// Connect to all three services and register every handler.
    ///
    /// Either the returned bridge is fully wired, or every session opened along
    /// the way has been released again before the error is returned.
    pub fn connect(
        config: BridgeConfig,
        delegate: Weak<dyn AppBridgeDelegate>,
        services: Services,
    ) -> Result<Self, BridgeError> {
        if delegate.upgrade().is_none() {
            return Err(BridgeError::DelegateGone);
        }
        config
            .validate()
            .map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;

        info!("🔗 Connecting app bridge for role {} ({})", config.role, config.app_id);

        let name = config.name.clone();
        let core = Arc::new(BridgeCore {
            config,
            delegate,
            controller: services.controller,
            window_manager: services.window_manager,
            home_screen: services.home_screen,
            pending_create: Mutex::new(true),
            surface_owners: Mutex::new(HashMap::new()),
        });
        let this = Arc::downgrade(&core);

        core.init_window_manager(&this)?;

        if let Err(err) = core.init_home_screen(&this) {
            core.close_window_manager();
            return Err(err);
        }

        if let Err(err) = core.init_controller(&this) {
            core.close_home_screen();
            core.close_window_manager();
            return Err(err);
        }

        info!("✅ App bridge ready for role {}", core.config.role);

        Ok(Self {
            core,
            name,
            torn_down: false,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.core.config
    }

    pub fn role(&self) -> &str {
        &self.core.config.role
    }

    pub fn app_id(&self) -> &str {
        &self.core.config.app_id
    }

    pub fn port(&self) -> u16 {
        self.core.config.port
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Whether the first matching surface is still to come
    pub fn is_pending_create(&self) -> bool {
        *self.core.pending_create.lock()
    }

    /// Bind `id` to this bridge's role, activating it if it is the first one
    pub fn setup_surface(&self, id: SurfaceId) {
        self.core.setup_surface(id);
    }

    /// Feed one lifecycle notification, as the registered sink does
    pub fn handle_notification(&self, notification: LifecycleNotification) {
        self.core.handle_notification(notification);
    }

    /// Release every service, reporting all steps that failed
    pub fn shutdown(mut self) -> Result<(), TeardownError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), TeardownError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;
        self.core.release()
    }
}

impl Drop for SurfaceBridge {
    fn drop(&mut self) {
        debug!("AppBridge dtor");
        if let Err(e) = self.teardown() {
            error!("❌ {}", e);
        }
    }
}

impl BridgeCore {
    fn init_window_manager(&self, this: &Weak<BridgeCore>) -> Result<(), BridgeError> {
        self.window_manager
            .init(self.config.port, &self.config.token)
            .map_err(BridgeError::WindowManager)?;

        for event in WmEvent::ALL {
            let this = this.clone();
            self.window_manager.set_event_handler(
                event,
                Box::new(move |_payload: &Value| {
                    if let Some(core) = this.upgrade() {
                        core.on_window_manager_event(event);
                    }
                }),
            );
        }

        debug!("Window manager session open on port {}", self.config.port);
        Ok(())
    }

    fn init_home_screen(&self, this: &Weak<BridgeCore>) -> Result<(), BridgeError> {
        self.home_screen
            .init(self.config.port, &self.config.token)
            .map_err(BridgeError::HomeScreen)?;

        for event in HsEvent::ALL {
            let this = this.clone();
            self.home_screen.set_event_handler(
                event,
                Box::new(move |payload: &Value| {
                    if let Some(core) = this.upgrade() {
                        core.on_home_screen_event(event, payload);
                    }
                }),
            );
        }

        debug!("Home screen session open on port {}", self.config.port);
        Ok(())
    }

    fn init_controller(&self, this: &Weak<BridgeCore>) -> Result<(), BridgeError> {
        self.controller.init().map_err(BridgeError::ControllerInit)?;

        let this = this.clone();
        let sink: NotificationSink = Arc::new(move |notification: LifecycleNotification| {
            if let Some(core) = this.upgrade() {
                core.handle_notification(notification);
            }
        });

        if let Err(e) = self.controller.register_notification_sink(sink) {
            if let Err(shutdown_err) = self.controller.shutdown() {
                warn!("⚠️ Surface controller shutdown failed: {}", shutdown_err);
            }
            return Err(BridgeError::NotificationSink(e));
        }

        Ok(())
    }

    fn close_window_manager(&self) {
        if let Err(e) = self.window_manager.close() {
            warn!("⚠️ Window manager session did not close cleanly: {}", e);
        }
    }

    fn close_home_screen(&self) {
        if let Err(e) = self.home_screen.close() {
            warn!("⚠️ Home screen session did not close cleanly: {}", e);
        }
    }

    /// Unregister, shut down, then close both sessions. Never stops early.
    fn release(&self) -> Result<(), TeardownError> {
        let mut failures = Vec::new();

        if let Err(e) = self.controller.unregister_notification_sink() {
            failures.push((TeardownStage::UnregisterSink, e));
        }
        if let Err(e) = self.controller.shutdown() {
            failures.push((TeardownStage::ControllerShutdown, e));
        }
        if let Err(e) = self.window_manager.close() {
            failures.push((TeardownStage::WindowManagerClose, e));
        }
        if let Err(e) = self.home_screen.close() {
            failures.push((TeardownStage::HomeScreenClose, e));
        }

        if failures.is_empty() {
            info!("🔽 App bridge for role {} released", self.config.role);
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    fn on_window_manager_event(&self, event: WmEvent) {
        debug!("Got {}", event);

        if event == WmEvent::SyncDraw {
            self.window_manager.end_draw(&self.config.role);
        }

        let Some(delegate) = self.delegate.upgrade() else {
            return;
        };
        match event {
            WmEvent::Active => delegate.on_active(),
            WmEvent::Inactive => delegate.on_inactive(),
            WmEvent::Visible => delegate.on_visible(),
            WmEvent::Invisible => delegate.on_invisible(),
            WmEvent::SyncDraw => delegate.on_sync_draw(),
            WmEvent::FlushDraw => delegate.on_flush_draw(),
        }
    }

    fn on_home_screen_event(&self, event: HsEvent, payload: &Value) {
        match event {
            HsEvent::TapShortcut => {
                debug!("Activesurface {}", self.config.role);
                self.window_manager
                    .activate_window(&self.config.role, &self.config.activation_area);

                if let Some(delegate) = self.delegate.upgrade() {
                    delegate.on_tap_shortcut();
                }
            }
            HsEvent::OnScreenMessage => {
                let message = payload.to_string();
                debug!("Got event [{}]", message);

                if let Some(delegate) = self.delegate.upgrade() {
                    delegate.on_screen_message(&message);
                }
            }
        }
    }

    fn handle_notification(&self, notification: LifecycleNotification) {
        let LifecycleNotification { kind, id, created } = notification;
        match kind {
            ObjectKind::Layer => {
                if created {
                    debug!("ILM_LAYER: {} created", id);
                } else {
                    debug!("ILM_LAYER: {} destroyed", id);
                }
            }
            ObjectKind::Surface if created => self.on_surface_created(id),
            ObjectKind::Surface => self.on_surface_destroyed(id),
        }
    }

    fn on_surface_created(&self, id: SurfaceId) {
        let pid = match self.controller.surface_owner(id) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("⚠️ Dropping creation of surface {}: owner lookup failed: {}", id, e);
                return;
            }
        };
        debug!("ILM_SURFACE (id={}, pid={}) is created", id, pid);

        let Some(delegate) = self.delegate.upgrade() else {
            return;
        };
        delegate.on_surface_created(id, pid);

        let requested = delegate.on_requested_surface_id(id);
        debug!("ILM_SURFACE requested pid for surface {} is {:?}", id, requested);

        if requested == Some(pid) {
            self.surface_owners.lock().insert(id, pid);
            self.setup_surface(id);
        }
    }

    fn on_surface_destroyed(&self, id: SurfaceId) {
        let cached = self.surface_owners.lock().remove(&id);
        let pid = cached.or_else(|| match self.controller.surface_owner(id) {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("No owner for destroyed surface {}: {}", id, e);
                None
            }
        });
        debug!("ILM_SURFACE (id={}, pid={:?}) destroyed", id, pid);

        if let Some(delegate) = self.delegate.upgrade() {
            delegate.on_surface_destroyed(id, pid);
        }
    }

    fn setup_surface(&self, id: SurfaceId) {
        let role = &self.config.role;
        debug!("requestSurfaceXDG({}, {})", role, id);
        self.window_manager.request_surface_xdg(role, id);

        let first = std::mem::replace(&mut *self.pending_create.lock(), false);
        if first {
            // The shortcut tap of a cold start was dropped; no window existed yet.
            info!("🪟 Activating {} in {} for its first surface", role, self.config.activation_area);
            self.window_manager
                .activate_window(role, &self.config.activation_area);
        }
    }
}
