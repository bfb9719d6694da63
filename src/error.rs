//! Error types for the bridge and the services it talks to

use std::fmt;
use thiserror::Error;

use crate::services::SurfaceId;

/// Failure reported by one of the platform services
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service could not be reached or refused the session
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with a non-success status code
    #[error("call failed with status {0}")]
    Status(i32),

    /// The controller has no record of this surface
    #[error("unknown surface {0}")]
    UnknownSurface(SurfaceId),
}

/// Reasons `SurfaceBridge::connect` can fail
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The delegate was already dropped when the bridge was constructed
    #[error("delegate is not alive")]
    DelegateGone,

    #[error("invalid bridge configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to set up window manager session")]
    WindowManager(#[source] ServiceError),

    #[error("failed to set up home screen session")]
    HomeScreen(#[source] ServiceError),

    #[error("failed to initialize surface controller")]
    ControllerInit(#[source] ServiceError),

    #[error("failed to register lifecycle notification sink")]
    NotificationSink(#[source] ServiceError),
}

/// Release step that failed during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    UnregisterSink,
    ControllerShutdown,
    WindowManagerClose,
    HomeScreenClose,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStage::UnregisterSink => "unregister notification sink",
            TeardownStage::ControllerShutdown => "shut down surface controller",
            TeardownStage::WindowManagerClose => "close window manager session",
            TeardownStage::HomeScreenClose => "close home screen session",
        };
        f.write_str(name)
    }
}

/// Every release step that failed while tearing the bridge down.
///
/// Teardown never stops at the first failure, so this can carry several entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bridge teardown failed: {}", summarize(.failures))]
pub struct TeardownError {
    pub failures: Vec<(TeardownStage, ServiceError)>,
}

impl TeardownError {
    /// Whether a given step is among the failures
    pub fn failed(&self, stage: TeardownStage) -> bool {
        self.failures.iter().any(|(s, _)| *s == stage)
    }
}

fn summarize(failures: &[(TeardownStage, ServiceError)]) -> String {
    failures
        .iter()
        .map(|(stage, err)| format!("{stage}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
