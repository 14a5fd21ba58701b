//! Lumacast Demo — headless run of the compositing engine.
//!
//! Feeds a synthetic camera through the engine with a LUT, beauty and a
//! moving face, taps the output over direct capture and logs stats.
//!
//! Usage: `lumacast-demo [engine-config.json]`. `RUST_LOG` sets the filter.

mod camera;
mod config;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lumacast_core::lut::store::BUILTIN_TEAL_ORANGE;
use lumacast_core::{BeautyConfig, ConfigError, EngineConfig, GradeParameters, VideoSource};
use lumacast_engine::{DistributorError, Engine, EngineError};

use crate::camera::{SyntheticCamera, orbiting_face};
use crate::config::DemoConfig;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Distributor(#[from] DistributorError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .init();
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        tracing::error!("demo failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let engine_config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env()?,
    };
    let demo = DemoConfig::default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("lumacast-rt")
        .enable_all()
        .build()?;

    let mut camera = SyntheticCamera::start(demo.width, demo.height, demo.camera_fps)?;
    let source: Arc<dyn VideoSource> = camera.slot().clone();
    let mut engine = Engine::start(engine_config, source, runtime.handle())?;

    let lut_source = demo.lut.clone().unwrap_or_else(|| BUILTIN_TEAL_ORANGE.to_string());
    match runtime.block_on(engine.load_lut(lut_source)) {
        Ok(Ok(lut)) => tracing::info!("LUT `{}` active", lut.name),
        Ok(Err(e)) => tracing::warn!("LUT not loaded: {e}"),
        Err(e) => tracing::warn!("LUT task failed: {e}"),
    }

    engine.snapshots().update(|s| {
        s.grade = GradeParameters {
            exposure: 0.1,
            saturation: 1.1,
            lut_strength: 0.8,
            vignette: 0.3,
            ..Default::default()
        };
        s.beauty = BeautyConfig {
            enabled: true,
            smooth: 0.5,
            eye_brighten: 0.3,
            ..Default::default()
        };
    });

    let mut faults = engine.subscribe_faults();
    let mut capture = engine.distributor_mut().start_direct()?;

    let start = Instant::now();
    let deadline = start + Duration::from_secs(demo.seconds);
    let mut captured = 0u64;
    let mut last_log = start;
    while Instant::now() < deadline {
        let now = Instant::now();
        let latest = camera.slot().latest_frame().map_or(0, |f| f.sequence);
        engine.push_landmarks(vec![orbiting_face(now.duration_since(start).as_secs_f32())], latest);

        if capture.poll(now).is_some() {
            captured += 1;
        }
        while let Ok(fault) = faults.try_recv() {
            tracing::warn!(?fault, "engine fault");
        }
        if now.duration_since(last_log) >= Duration::from_secs(1) {
            last_log = now;
            let stats = engine.stats();
            tracing::info!(
                "{} | {:.1} fps | {:.2} ms | dropped {} | captured {captured} | route {:?} | health {:?}",
                stats.resolution,
                stats.fps,
                stats.frame_time_ms,
                stats.dropped_frames,
                engine.route(),
                engine.health_state()
            );
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    engine.shutdown();
    camera.stop();
    tracing::info!("demo finished: {captured} frames captured");
    Ok(())
}
