//! Engine end to end on the CPU backend with a synthetic camera thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};
use tokio::runtime::Handle;

use lumacast_core::health::HealthState;
use lumacast_core::lut::store::BUILTIN_TEAL_ORANGE;
use lumacast_core::mask::{FaceLandmarks, regions};
use lumacast_core::render::{RenderBackend, RenderInputs, RenderedFrame};
use lumacast_core::{
    BackendError, BackendPreference, EngineConfig, FrameSlot, HealthConfig, RenderMode,
};
use lumacast_engine::{Engine, OutputRoute};

/// Pushes a moving gradient into a [`FrameSlot`] every 10 ms.
struct FakeCamera {
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeCamera {
    fn start() -> Self {
        let slot = Arc::new(FrameSlot::new());
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let slot = slot.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut n = 0u32;
                while !stop.load(Ordering::Acquire) {
                    slot.push(RgbaImage::from_fn(32, 24, |x, y| {
                        Rgba([(x * 8 + n) as u8, (y * 10) as u8, 128, 255])
                    }));
                    n = n.wrapping_add(1);
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
        };
        Self {
            slot,
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Accepts work but never hands back a frame.
struct SilentBackend;

impl RenderBackend for SilentBackend {
    fn name(&self) -> &'static str {
        "silent"
    }
    fn acquire(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
    fn release(&mut self) {}
    fn is_context_lost(&self) -> bool {
        false
    }
    fn render(&mut self, _: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
        Ok(None)
    }
}

/// Passes video through until its device is removed; it never comes back.
struct RemovableDevice {
    removed: Arc<AtomicBool>,
}

impl RenderBackend for RemovableDevice {
    fn name(&self) -> &'static str {
        "removable"
    }
    fn acquire(&mut self) -> Result<(), BackendError> {
        if self.removed.load(Ordering::Acquire) {
            return Err(BackendError::NoAdapter("device removed".into()));
        }
        Ok(())
    }
    fn release(&mut self) {}
    fn is_context_lost(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
    fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        Ok(Some(RenderedFrame {
            image: Arc::clone(&inputs.frame.image),
            source_sequence: inputs.frame.sequence,
        }))
    }
}

fn cpu_config() -> EngineConfig {
    EngineConfig {
        refresh_hz: 120.0,
        backend: BackendPreference::Cpu,
        ..Default::default()
    }
}

async fn wait_for(what: &str, timeout: Duration, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn face() -> FaceLandmarks {
    let center = Vec2::new(0.5, 0.5);
    let mut points = vec![Vec3::new(center.x, center.y, 0.0); regions::LANDMARK_COUNT];
    for (n, idx) in regions::FACE_OVAL.iter().enumerate() {
        let a = n as f32 / regions::FACE_OVAL.len() as f32 * std::f32::consts::TAU;
        points[*idx] = Vec3::new(center.x + 0.3 * a.cos(), center.y + 0.3 * a.sin(), 0.0);
    }
    FaceLandmarks::new(points)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_composites_until_shutdown() {
    let camera = FakeCamera::start();
    let mut engine = Engine::start(cpu_config(), camera.slot.clone(), &Handle::current()).unwrap();
    assert_eq!(engine.backend_name(), "cpu");

    let surface = engine.surface().clone();
    wait_for("three frames", Duration::from_secs(5), || surface.version() >= 3).await;
    let frame = surface.latest().unwrap();
    assert!(!frame.passthrough);
    assert_eq!(frame.dimensions(), (32, 24));

    wait_for("healthy output", Duration::from_secs(5), || {
        engine.health_state() == HealthState::Healthy
    })
    .await;
    assert!(engine.stats().fps > 0.0);
    assert_eq!(engine.stats().resolution, "32x24");
    assert_eq!(engine.route(), OutputRoute::Composited);

    engine.shutdown();
    assert!(!engine.is_running());
    let version = surface.version();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(surface.version(), version, "no frame after shutdown");
    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lut_and_landmarks_flow_into_the_engine() {
    let camera = FakeCamera::start();
    let engine = Engine::start(cpu_config(), camera.slot.clone(), &Handle::current()).unwrap();

    let lut = engine.load_lut(BUILTIN_TEAL_ORANGE).await.unwrap().unwrap();
    assert_eq!(engine.luts().active().unwrap().size, lut.size);

    let sequence = camera.slot.push(RgbaImage::new(32, 24));
    engine.push_landmarks(vec![face()], sequence);
    wait_for("masks", Duration::from_secs(5), || {
        engine.masks().latest().is_some_and(|m| m.source_sequence == sequence && !m.is_empty())
    })
    .await;

    engine.landmarks_lost(sequence + 1);
    wait_for("cleared masks", Duration::from_secs(5), || {
        engine.masks().latest().is_some_and(|m| m.is_empty())
    })
    .await;

    engine.snapshots().set_render_mode(RenderMode::Histogram);
    let surface = engine.surface().clone();
    let start = surface.version();
    wait_for("histogram frames", Duration::from_secs(5), || surface.version() >= start + 2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_backend_falls_back_to_raw_video() {
    let camera = FakeCamera::start();
    let config = EngineConfig {
        health: HealthConfig {
            poll_interval_ms: 20,
            timeout_ms: 200,
        },
        ..cpu_config()
    };
    let engine =
        Engine::start_with_backend(config, camera.slot.clone(), &Handle::current(), Box::new(SilentBackend))
            .unwrap();

    wait_for("fallback", Duration::from_secs(5), || engine.route() == OutputRoute::RawPassthrough).await;
    assert_eq!(engine.health_state(), HealthState::Fallback);

    let surface = engine.surface().clone();
    wait_for("raw frames", Duration::from_secs(5), || {
        surface.latest().is_some_and(|f| f.passthrough)
    })
    .await;

    engine.reinitialize();
    wait_for("composited route", Duration::from_secs(5), || {
        engine.route() == OutputRoute::Composited
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_permanent_context_loss_falls_back_to_raw_video() {
    let camera = FakeCamera::start();
    let config = EngineConfig {
        health: HealthConfig {
            poll_interval_ms: 20,
            timeout_ms: 300,
        },
        ..cpu_config()
    };
    let removed = Arc::new(AtomicBool::new(false));
    let backend = RemovableDevice {
        removed: Arc::clone(&removed),
    };
    let engine =
        Engine::start_with_backend(config, camera.slot.clone(), &Handle::current(), Box::new(backend))
            .unwrap();

    wait_for("healthy output", Duration::from_secs(5), || {
        engine.health_state() == HealthState::Healthy
    })
    .await;
    assert_eq!(engine.route(), OutputRoute::Composited);

    removed.store(true, Ordering::Release);
    wait_for("fallback", Duration::from_secs(5), || engine.route() == OutputRoute::RawPassthrough).await;
    assert_eq!(engine.health_state(), HealthState::Fallback);

    let surface = engine.surface().clone();
    wait_for("raw frames", Duration::from_secs(5), || {
        surface.latest().is_some_and(|f| f.passthrough)
    })
    .await;
    wait_for("stats to decay", Duration::from_secs(5), || engine.stats().fps == 0.0).await;
}
