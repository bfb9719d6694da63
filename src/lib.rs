//! # AppBridge
//!
//! Connects an infotainment application to the platform's surface controller,
//! window manager and home screen, and reports what they send through one
//! callback trait.
//!
//! ## Architecture
//!
//! - `bridge`: `SurfaceBridge`, the adapter itself
//! - `delegate`: `AppBridgeDelegate`, the callbacks an application implements
//! - `services`: contracts of the three platform services
//! - `config`: bridge configuration (port, token, app id, role)
//! - `error`: construction and teardown errors
//! - `loopback`: in-process implementation of the services
//! - `replay`: scripted event replay over the loopback services
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use appbridge::{AppBridgeDelegate, BridgeConfig, SurfaceBridge};
//! use appbridge::loopback::LoopbackPlatform;
//!
//! struct Player;
//! impl AppBridgeDelegate for Player {
//!     fn on_requested_surface_id(&self, _id: u32) -> Option<i32> {
//!         Some(std::process::id() as i32)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let delegate: Arc<dyn AppBridgeDelegate> = Arc::new(Player);
//!     let config = BridgeConfig::new(1700, "token", "mediaplayer", "MediaPlayer");
//!     let platform = LoopbackPlatform::new();
//!     let bridge = SurfaceBridge::connect(config, Arc::downgrade(&delegate), platform.services())?;
//!     bridge.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod delegate;
pub mod error;
pub mod loopback;
pub mod replay;
pub mod services;

// Re-export main types for easy access
pub use bridge::SurfaceBridge;
pub use config::BridgeConfig;
pub use delegate::AppBridgeDelegate;
pub use error::{BridgeError, ServiceError, TeardownError, TeardownStage};
pub use services::{
    HomeScreenClient, HsEvent, LifecycleNotification, ObjectKind, Pid, Services,
    SurfaceController, SurfaceId, WindowManagerClient, WmEvent, AREA_NORMAL_FULL,
};

/// Version information for AppBridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
