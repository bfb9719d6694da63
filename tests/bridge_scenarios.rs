//! End-to-end behavior of the surface bridge over the loopback platform
//!
//! Covers surface filtering, first-surface activation, event forwarding and
//! construction/teardown through real service handles.

use appbridge::loopback::{FailPoint, LoopbackPlatform, PlatformCall};
use appbridge::replay::{DelegateCall, RecordingDelegate};
use appbridge::{
    AppBridgeDelegate, BridgeConfig, BridgeError, HsEvent, LifecycleNotification, SurfaceBridge,
    TeardownStage, WmEvent,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

const ROLE: &str = "mediaplayer";
const REQUESTED_PID: i32 = 1234;

struct Harness {
    platform: LoopbackPlatform,
    recorder: Arc<RecordingDelegate>,
    // Keeps the delegate alive; the bridge only holds a weak reference
    _delegate: Arc<dyn AppBridgeDelegate>,
    bridge: SurfaceBridge,
}

fn config() -> BridgeConfig {
    BridgeConfig::new(1700, "secret", "mediaplayer", ROLE)
}

fn harness() -> Harness {
    let platform = LoopbackPlatform::new();
    let recorder = Arc::new(RecordingDelegate::new(Some(REQUESTED_PID)));
    let delegate: Arc<dyn AppBridgeDelegate> = recorder.clone();
    let bridge = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services())
        .expect("bridge connects");
    platform.clear_calls();

    Harness { platform, recorder, _delegate: delegate, bridge }
}

#[test]
fn test_construction_registers_every_handler_once() {
    let platform = LoopbackPlatform::new();
    let delegate: Arc<dyn AppBridgeDelegate> = Arc::new(RecordingDelegate::default());
    let bridge = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services())
        .unwrap();

    let calls = platform.calls();
    assert_eq!(
        calls[0],
        PlatformCall::WindowManagerInit { port: 1700, token: "secret".into() }
    );
    for event in WmEvent::ALL {
        let count = calls
            .iter()
            .filter(|c| **c == PlatformCall::WindowManagerHandler { event })
            .count();
        assert_eq!(count, 1, "{event} handler");
    }
    for event in HsEvent::ALL {
        let count = calls
            .iter()
            .filter(|c| **c == PlatformCall::HomeScreenHandler { event })
            .count();
        assert_eq!(count, 1, "{event} handler");
    }
    assert_eq!(
        calls.iter().filter(|c| **c == PlatformCall::RegisterSink).count(),
        1
    );
    assert!(platform.has_sink());
    assert!(bridge.is_pending_create());
}

#[test]
fn test_matching_surface_is_bound_and_activated() {
    let h = harness();

    h.platform.create_surface(7, REQUESTED_PID);

    assert_eq!(
        h.recorder.calls(),
        vec![
            DelegateCall::SurfaceCreated { id: 7, pid: REQUESTED_PID },
            DelegateCall::RequestedSurfaceId { id: 7 },
        ]
    );
    assert_eq!(
        h.platform.calls(),
        vec![
            PlatformCall::RequestSurfaceXdg { role: ROLE.into(), id: 7 },
            PlatformCall::ActivateWindow { role: ROLE.into(), area: "normal.full".into() },
        ]
    );
    assert!(!h.bridge.is_pending_create());
}

#[test]
fn test_foreign_surface_is_only_reported() {
    let h = harness();

    h.platform.create_surface(8, 9999);

    assert_eq!(
        h.recorder.calls(),
        vec![
            DelegateCall::SurfaceCreated { id: 8, pid: 9999 },
            DelegateCall::RequestedSurfaceId { id: 8 },
        ]
    );
    assert!(h.platform.bindings().is_empty());
    assert!(h.platform.activations().is_empty());
    assert!(h.bridge.is_pending_create());
}

#[test]
fn test_no_requested_pid_binds_nothing() {
    let h = harness();
    h.recorder.set_requested_pid(None);

    h.platform.create_surface(3, REQUESTED_PID);

    assert!(h.platform.bindings().is_empty());
    assert!(h.bridge.is_pending_create());
}

#[test]
fn test_second_matching_surface_is_bound_without_activation() {
    let h = harness();

    h.platform.create_surface(7, REQUESTED_PID);
    h.platform.create_surface(11, REQUESTED_PID);

    assert_eq!(
        h.platform.bindings(),
        vec![(ROLE.to_string(), 7), (ROLE.to_string(), 11)]
    );
    assert_eq!(h.platform.activations().len(), 1);
    assert!(!h.bridge.is_pending_create());
}

#[test]
fn test_foreign_surface_then_matching_surface() {
    let h = harness();

    h.platform.create_surface(8, 9999);
    h.platform.create_surface(9, REQUESTED_PID);

    assert_eq!(h.platform.bindings(), vec![(ROLE.to_string(), 9)]);
    assert_eq!(h.platform.activations().len(), 1);
}

#[test]
fn test_layers_never_reach_the_delegate() {
    let h = harness();

    h.platform.create_layer(1000);
    h.platform.destroy_layer(1000);

    assert!(h.recorder.calls().is_empty());
    assert!(h.platform.calls().is_empty());
}

#[test]
fn test_destroyed_surface_reports_creation_pid() {
    let h = harness();

    h.platform.create_surface(7, REQUESTED_PID);
    // The loopback forgets the owner before notifying, so only the cache knows it
    h.platform.destroy_surface(7);

    let calls = h.recorder.calls();
    assert_eq!(
        calls.last(),
        Some(&DelegateCall::SurfaceDestroyed { id: 7, pid: Some(REQUESTED_PID) })
    );
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, DelegateCall::SurfaceCreated { .. }))
            .count(),
        1
    );
}

#[test]
fn test_foreign_surface_owner_is_not_cached() {
    let h = harness();

    h.platform.create_surface(8, 9999);
    h.platform.destroy_surface(8);

    assert_eq!(
        h.recorder.calls().last(),
        Some(&DelegateCall::SurfaceDestroyed { id: 8, pid: None })
    );
}

#[test]
fn test_foreign_surface_destroy_uses_live_lookup() {
    let h = harness();

    h.platform.create_surface(8, 9999);
    // Owner still queryable when the destruction arrives
    h.bridge.handle_notification(LifecycleNotification::surface(8, false));

    assert_eq!(
        h.recorder.calls().last(),
        Some(&DelegateCall::SurfaceDestroyed { id: 8, pid: Some(9999) })
    );
}

#[test]
fn test_destroyed_unknown_surface_has_no_pid() {
    let h = harness();

    h.platform.destroy_surface(42);

    assert_eq!(
        h.recorder.calls(),
        vec![DelegateCall::SurfaceDestroyed { id: 42, pid: None }]
    );
}

#[test]
fn test_window_manager_events_are_forwarded() {
    let h = harness();

    for event in WmEvent::ALL {
        assert!(h.platform.emit_window_manager(event, &Value::Null));
    }

    assert_eq!(
        h.recorder.calls(),
        vec![
            DelegateCall::Active,
            DelegateCall::Inactive,
            DelegateCall::Visible,
            DelegateCall::Invisible,
            DelegateCall::SyncDraw,
            DelegateCall::FlushDraw,
        ]
    );
    assert_eq!(
        h.platform.calls(),
        vec![PlatformCall::EndDraw { role: ROLE.into() }]
    );
}

/// Checks, from inside the callback, that the draw cycle was already ended
struct SyncDrawWitness {
    platform: LoopbackPlatform,
    end_draw_seen: Mutex<Option<bool>>,
}

impl AppBridgeDelegate for SyncDrawWitness {
    fn on_sync_draw(&self) {
        let seen = self
            .platform
            .calls()
            .contains(&PlatformCall::EndDraw { role: ROLE.into() });
        *self.end_draw_seen.lock() = Some(seen);
    }
}

#[test]
fn test_sync_draw_ends_draw_before_delegate() {
    let platform = LoopbackPlatform::new();
    let witness = Arc::new(SyncDrawWitness {
        platform: platform.clone(),
        end_draw_seen: Mutex::new(None),
    });
    let delegate: Arc<dyn AppBridgeDelegate> = witness.clone();
    let _bridge = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services())
        .unwrap();
    platform.clear_calls();

    platform.emit_window_manager(WmEvent::SyncDraw, &json!({"kind": "sync"}));

    assert_eq!(*witness.end_draw_seen.lock(), Some(true));
}

#[test]
fn test_tap_shortcut_activates_before_any_surface() {
    let h = harness();

    assert!(h.platform.emit_home_screen(HsEvent::TapShortcut, &Value::Null));

    assert_eq!(
        h.platform.activations(),
        vec![(ROLE.to_string(), "normal.full".to_string())]
    );
    assert!(h.platform.bindings().is_empty());
    assert_eq!(h.recorder.calls(), vec![DelegateCall::TapShortcut]);
    // The tap does not count as the first binding
    assert!(h.bridge.is_pending_create());
}

#[test]
fn test_screen_message_is_passed_as_json_text() {
    let h = harness();

    h.platform
        .emit_home_screen(HsEvent::OnScreenMessage, &json!({"k": "v"}));

    assert_eq!(
        h.recorder.calls(),
        vec![DelegateCall::ScreenMessage { message: r#"{"k":"v"}"#.to_string() }]
    );
}

#[test]
fn test_screen_message_keeps_key_order() {
    let h = harness();

    h.platform.emit_home_screen(
        HsEvent::OnScreenMessage,
        &json!({"zeta": 1, "alpha": 2, "mid": {"y": true, "b": null}}),
    );

    assert_eq!(
        h.recorder.calls(),
        vec![DelegateCall::ScreenMessage {
            message: r#"{"zeta":1,"alpha":2,"mid":{"y":true,"b":null}}"#.to_string()
        }]
    );
}

#[test]
fn test_concurrent_matching_surfaces_activate_once() {
    const THREADS: u32 = 8;
    let h = harness();

    std::thread::scope(|scope| {
        for id in 1..=THREADS {
            let platform = h.platform.clone();
            scope.spawn(move || platform.create_surface(id, REQUESTED_PID));
        }
    });

    let mut bound: Vec<u32> = h.platform.bindings().into_iter().map(|(_, id)| id).collect();
    bound.sort_unstable();
    assert_eq!(bound, (1..=THREADS).collect::<Vec<_>>());
    assert_eq!(h.platform.activations().len(), 1);
    assert!(!h.bridge.is_pending_create());
}

#[test]
fn test_custom_activation_area() {
    let platform = LoopbackPlatform::new();
    let recorder = Arc::new(RecordingDelegate::new(Some(REQUESTED_PID)));
    let delegate: Arc<dyn AppBridgeDelegate> = recorder.clone();
    let mut cfg = config();
    cfg.activation_area = "split.main".to_string();
    let _bridge =
        SurfaceBridge::connect(cfg, Arc::downgrade(&delegate), platform.services()).unwrap();

    platform.create_surface(7, REQUESTED_PID);
    platform.emit_home_screen(HsEvent::TapShortcut, &Value::Null);

    assert_eq!(
        platform.activations(),
        vec![
            (ROLE.to_string(), "split.main".to_string()),
            (ROLE.to_string(), "split.main".to_string()),
        ]
    );
}

#[test]
fn test_dropped_delegate_silences_callbacks() {
    let platform = LoopbackPlatform::new();
    let recorder = Arc::new(RecordingDelegate::new(Some(REQUESTED_PID)));
    let delegate: Arc<dyn AppBridgeDelegate> = recorder.clone();
    let bridge = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services())
        .unwrap();
    drop(delegate);
    drop(recorder);
    platform.clear_calls();

    platform.emit_window_manager(WmEvent::SyncDraw, &Value::Null);
    platform.create_surface(7, REQUESTED_PID);

    // end_draw still runs; binding needs the delegate's answer
    assert_eq!(
        platform.calls(),
        vec![PlatformCall::EndDraw { role: ROLE.into() }]
    );
    assert!(bridge.is_pending_create());
}

#[test]
fn test_handlers_are_inert_after_drop() {
    let h = harness();
    let Harness { platform, recorder, _delegate, bridge } = h;

    drop(bridge);
    platform.clear_calls();

    platform.emit_home_screen(HsEvent::TapShortcut, &Value::Null);
    platform.create_surface(7, REQUESTED_PID);

    assert!(platform.calls().is_empty());
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_shutdown_releases_in_order() {
    let h = harness();
    let platform = h.platform.clone();

    h.bridge.shutdown().unwrap();

    assert_eq!(
        platform.calls(),
        vec![
            PlatformCall::UnregisterSink,
            PlatformCall::ControllerShutdown,
            PlatformCall::WindowManagerClose,
            PlatformCall::HomeScreenClose,
        ]
    );
    assert!(!platform.has_sink());
}

#[test]
fn test_drop_releases_once() {
    let h = harness();
    let platform = h.platform.clone();

    drop(h);

    let closes = platform
        .calls()
        .iter()
        .filter(|c| **c == PlatformCall::WindowManagerClose)
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn test_teardown_failures_are_aggregated() {
    let h = harness();
    let platform = h.platform.clone();
    platform.fail_at(FailPoint::UnregisterSink);
    platform.fail_at(FailPoint::ControllerShutdown);

    let err = h.bridge.shutdown().unwrap_err();

    assert!(err.failed(TeardownStage::UnregisterSink));
    assert!(err.failed(TeardownStage::ControllerShutdown));
    assert_eq!(err.failures.len(), 2);
    // Sessions are still closed
    let calls = platform.calls();
    assert!(calls.contains(&PlatformCall::WindowManagerClose));
    assert!(calls.contains(&PlatformCall::HomeScreenClose));
}

#[test]
fn test_failed_construction_releases_opened_sessions() {
    let platform = LoopbackPlatform::new();
    platform.fail_at(FailPoint::RegisterSink);
    let delegate: Arc<dyn AppBridgeDelegate> = Arc::new(RecordingDelegate::default());

    let result = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services());

    assert!(matches!(result, Err(BridgeError::NotificationSink(_))));
    let calls = platform.calls();
    let tail = &calls[calls.len() - 3..];
    assert_eq!(
        tail,
        &[
            PlatformCall::ControllerShutdown,
            PlatformCall::HomeScreenClose,
            PlatformCall::WindowManagerClose,
        ]
    );
    assert!(!platform.has_sink());
}

#[test]
fn test_home_screen_failure_skips_controller() {
    let platform = LoopbackPlatform::new();
    platform.fail_at(FailPoint::HomeScreenInit);
    let delegate: Arc<dyn AppBridgeDelegate> = Arc::new(RecordingDelegate::default());

    let result = SurfaceBridge::connect(config(), Arc::downgrade(&delegate), platform.services());

    assert!(matches!(result, Err(BridgeError::HomeScreen(_))));
    let calls = platform.calls();
    assert!(!calls.contains(&PlatformCall::ControllerInit));
    assert_eq!(calls.last(), Some(&PlatformCall::WindowManagerClose));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn foreign_surfaces_never_bind(
            id in 1u32..10_000,
            owner in any::<i32>().prop_filter("not the requested pid", |p| *p != REQUESTED_PID),
        ) {
            let h = harness();

            h.platform.create_surface(id, owner);

            prop_assert!(h.platform.bindings().is_empty());
            prop_assert!(h.platform.activations().is_empty());
            prop_assert!(h.bridge.is_pending_create());
        }

        #[test]
        fn matching_surfaces_bind_once_each(ids in proptest::collection::vec(1u32..10_000, 1..8)) {
            let h = harness();

            for id in &ids {
                h.platform.create_surface(*id, REQUESTED_PID);
            }

            let bound: Vec<u32> = h.platform.bindings().into_iter().map(|(_, id)| id).collect();
            prop_assert_eq!(bound, ids);
            prop_assert_eq!(h.platform.activations().len(), 1);
            prop_assert!(!h.bridge.is_pending_create());
        }
    }
}
