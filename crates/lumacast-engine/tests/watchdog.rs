//! Watchdog timing on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::runtime::Handle;
use tokio::time::sleep;

use lumacast_core::health::{FallbackReason, HealthState};
use lumacast_core::{EngineStats, FrameSlot, HealthConfig, HealthEvent, StatsCell};
use lumacast_engine::{EngineFault, FaultBus, LoopControl, OutputRoute, Watchdog, WatchdogInputs};

struct Rig {
    source: Arc<FrameSlot>,
    stats: Arc<StatsCell>,
    faults: FaultBus,
    control: LoopControl,
    watchdog: Watchdog,
}

fn rig(source_ready: bool) -> Rig {
    let source = Arc::new(FrameSlot::new());
    if source_ready {
        source.push(RgbaImage::new(64, 48));
    }
    let stats = Arc::new(StatsCell::default());
    let faults = FaultBus::new();
    let control = LoopControl::default();
    let watchdog = Watchdog::spawn(
        &Handle::current(),
        HealthConfig::default(),
        WatchdogInputs {
            source: source.clone(),
            stats: stats.clone(),
            faults: faults.clone(),
            control: control.clone(),
        },
    );
    Rig {
        source,
        stats,
        faults,
        control,
        watchdog,
    }
}

fn alive(stats: &StatsCell) {
    stats.publish(EngineStats {
        fps: 30.0,
        frame_time_ms: 33.3,
        dropped_frames: 0,
        resolution: "64x48".into(),
    });
}

#[tokio::test(start_paused = true)]
async fn test_fallback_fires_exactly_once_after_timeout() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();

    sleep(Duration::from_millis(2900)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(rig.control.route.get(), OutputRoute::Composited);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(
        events.try_recv().unwrap(),
        HealthEvent::FallbackTriggered(FallbackReason::Timeout)
    );
    assert_eq!(rig.control.route.get(), OutputRoute::RawPassthrough);

    sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err(), "fallback must not repeat");
    assert_eq!(rig.watchdog.state(), HealthState::Fallback);
}

#[tokio::test(start_paused = true)]
async fn test_never_fires_when_healthy_in_time() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();

    sleep(Duration::from_millis(1000)).await;
    alive(&rig.stats);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(events.try_recv().unwrap(), HealthEvent::BecameHealthy);

    rig.stats.publish(EngineStats::default());
    sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err(), "polling stops once healthy");
    assert_eq!(rig.watchdog.state(), HealthState::Healthy);
    assert_eq!(rig.control.route.get(), OutputRoute::Composited);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_starts_when_source_becomes_ready() {
    let rig = rig(false);
    let mut events = rig.watchdog.subscribe();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(rig.watchdog.state(), HealthState::Idle);
    assert!(events.try_recv().is_err());

    rig.source.push(RgbaImage::new(64, 48));
    sleep(Duration::from_millis(2500)).await;
    assert!(matches!(rig.watchdog.state(), HealthState::Watching { .. }));
    sleep(Duration::from_millis(800)).await;
    assert_eq!(
        events.try_recv().unwrap(),
        HealthEvent::FallbackTriggered(FallbackReason::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_render_stall_forces_fallback_once() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();
    sleep(Duration::from_millis(10)).await;

    rig.faults.publish(EngineFault::RenderStalled { consecutive_failures: 10 });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        events.try_recv().unwrap(),
        HealthEvent::FallbackTriggered(FallbackReason::Fault)
    );
    assert_eq!(rig.control.route.get(), OutputRoute::RawPassthrough);

    rig.faults.publish(EngineFault::RenderStalled { consecutive_failures: 10 });
    sleep(Duration::from_secs(5)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unrestored_context_loss_falls_back() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();
    alive(&rig.stats);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(events.try_recv().unwrap(), HealthEvent::BecameHealthy);

    rig.faults.publish(EngineFault::ContextLost { backend: "gpu" });
    sleep(Duration::from_millis(2900)).await;
    assert!(events.try_recv().is_err(), "restore still has time");
    assert_eq!(rig.control.route.get(), OutputRoute::Composited);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(
        events.try_recv().unwrap(),
        HealthEvent::FallbackTriggered(FallbackReason::ContextLost)
    );
    assert_eq!(rig.control.route.get(), OutputRoute::RawPassthrough);
    assert_eq!(rig.watchdog.state(), HealthState::Fallback);
}

#[tokio::test(start_paused = true)]
async fn test_restored_context_does_not_fall_back() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();
    alive(&rig.stats);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(events.try_recv().unwrap(), HealthEvent::BecameHealthy);

    rig.faults.publish(EngineFault::ContextLost { backend: "gpu" });
    sleep(Duration::from_millis(1000)).await;
    rig.faults.publish(EngineFault::ContextRestored { backend: "gpu" });
    sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(rig.watchdog.state(), HealthState::Healthy);
    assert_eq!(rig.control.route.get(), OutputRoute::Composited);
}

#[tokio::test(start_paused = true)]
async fn test_reinitialize_leaves_fallback_and_rearms() {
    let rig = rig(true);
    let mut events = rig.watchdog.subscribe();
    sleep(Duration::from_millis(3200)).await;
    assert!(matches!(events.try_recv(), Ok(HealthEvent::FallbackTriggered(_))));

    rig.watchdog.reinitialize();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.control.route.get(), OutputRoute::Composited);
    assert!(matches!(rig.watchdog.state(), HealthState::Watching { .. }));

    alive(&rig.stats);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(events.try_recv().unwrap(), HealthEvent::BecameHealthy);
}
