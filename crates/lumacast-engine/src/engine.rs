//! The engine facade: wires the stores, render loop, mask pump, watchdog
//! and distributor together and tears them down in order.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use lumacast_core::health::HealthState;
use lumacast_core::mask::ChannelMapError;
use lumacast_core::render::RenderBackend;
use lumacast_core::{
    BackendPreference, CpuBackend, EngineConfig, EngineStats, FaceLandmarks, HealthEvent,
    LutData, LutError, LutStore, MaskGenerator, OutputSurface, SnapshotStore, StatsCell,
    SurfaceReader, VideoSource,
};
use lumacast_core::lut::FileFetcher;
use lumacast_gpu::GpuBackend;

use crate::compositor::{Compositor, CompositorLinks};
use crate::distributor::{FrameDistributor, TransportCapabilities};
use crate::faults::{EngineFault, FaultBus};
use crate::landmarks::{LandmarkFeed, MaskPump, MaskSlot};
use crate::loader::AsyncLutLoader;
use crate::render_loop::{LoopControl, OutputRoute, RenderLoop};
use crate::watchdog::{Watchdog, WatchdogInputs};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid mask channel map: {0}")]
    Mask(#[from] ChannelMapError),
    #[error("failed to start render thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Pick the render backend for `preference`, falling back to the CPU.
pub fn select_backend(preference: BackendPreference) -> Box<dyn RenderBackend> {
    match preference {
        BackendPreference::Gpu if lumacast_gpu::is_available() => {
            tracing::info!("using GPU render backend");
            Box::new(GpuBackend::new())
        }
        BackendPreference::Gpu => {
            tracing::warn!("no compatible graphics adapter; using CPU render backend");
            Box::new(CpuBackend::new())
        }
        BackendPreference::Cpu => {
            tracing::info!("using CPU render backend");
            Box::new(CpuBackend::new())
        }
    }
}

/// A running compositing engine.
pub struct Engine {
    config: EngineConfig,
    backend_name: &'static str,
    snapshots: Arc<SnapshotStore>,
    luts: AsyncLutLoader,
    landmarks: LandmarkFeed,
    masks: MaskSlot,
    surface: Arc<OutputSurface>,
    stats: Arc<StatsCell>,
    faults: FaultBus,
    control: LoopControl,
    distributor: FrameDistributor,
    watchdog: Option<Watchdog>,
    mask_pump: Option<MaskPump>,
    render_loop: Option<RenderLoop>,
}

impl Engine {
    /// Start with the backend chosen by `config.backend`.
    pub fn start(
        config: EngineConfig,
        source: Arc<dyn VideoSource>,
        handle: &Handle,
    ) -> Result<Self, EngineError> {
        let backend = select_backend(config.backend);
        Self::start_with_backend(config, source, handle, backend)
    }

    /// Start with an explicit backend.
    pub fn start_with_backend(
        config: EngineConfig,
        source: Arc<dyn VideoSource>,
        handle: &Handle,
        backend: Box<dyn RenderBackend>,
    ) -> Result<Self, EngineError> {
        let generator = MaskGenerator::new(config.mask.clone())?;

        let snapshots = Arc::new(SnapshotStore::default());
        let store = Arc::new(
            LutStore::new(config.lut_cache_capacity, Arc::new(FileFetcher))
                .with_max_attempts(config.lut_load_attempts),
        );
        let faults = FaultBus::new();
        let surface = OutputSurface::new();
        let stats = Arc::new(StatsCell::default());
        let masks = MaskSlot::new();
        let landmarks = LandmarkFeed::new();
        let control = LoopControl::default();

        let links = CompositorLinks {
            source: Arc::clone(&source),
            snapshots: Arc::clone(&snapshots),
            luts: Arc::clone(&store),
            masks: masks.clone(),
            surface: Arc::clone(&surface),
            stats: Arc::clone(&stats),
            faults: faults.clone(),
        };
        let backend_name = backend.name();
        let compositor = Compositor::new(
            backend,
            links,
            config.refresh_hz,
            config.mask_staleness_frames,
        );
        let render_loop = RenderLoop::spawn(compositor, config.refresh_hz, control.clone())?;

        let mask_pump = MaskPump::spawn(
            handle,
            generator,
            &landmarks,
            Arc::clone(&source),
            masks.clone(),
        );
        let watchdog = Watchdog::spawn(
            handle,
            config.health.clone(),
            WatchdogInputs {
                source,
                stats: Arc::clone(&stats),
                faults: faults.clone(),
                control: control.clone(),
            },
        );
        let distributor = FrameDistributor::new(
            Arc::clone(&surface),
            config.distributor.clone(),
            TransportCapabilities::all(),
            faults.clone(),
        );

        tracing::info!("engine started ({backend_name} backend, {} Hz)", config.refresh_hz);
        Ok(Self {
            config,
            backend_name,
            snapshots,
            luts: AsyncLutLoader::new(store, faults.clone(), handle.clone()),
            landmarks,
            masks,
            surface,
            stats,
            faults,
            control,
            distributor,
            watchdog: Some(watchdog),
            mask_pump: Some(mask_pump),
            render_loop: Some(render_loop),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Grading/transform/beauty/mode parameters read once per tick.
    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn luts(&self) -> &Arc<LutStore> {
        self.luts.store()
    }

    /// Load and activate a LUT without blocking the render loop.
    pub fn load_lut(&self, source: impl Into<String>) -> JoinHandle<Result<Arc<LutData>, LutError>> {
        self.luts.request(source)
    }

    /// Clear a LUT's unavailable mark and load it again.
    pub fn retry_lut(&self, source: impl Into<String>) -> JoinHandle<Result<Arc<LutData>, LutError>> {
        self.luts.retry(source)
    }

    /// Landmarks for the capture with `source_sequence`.
    pub fn push_landmarks(&self, faces: Vec<FaceLandmarks>, source_sequence: u64) {
        self.landmarks.push(faces, source_sequence);
    }

    /// The detector lost the face.
    pub fn landmarks_lost(&self, source_sequence: u64) {
        self.landmarks.lost(source_sequence);
    }

    pub fn masks(&self) -> &MaskSlot {
        &self.masks
    }

    pub fn surface(&self) -> &Arc<OutputSurface> {
        &self.surface
    }

    pub fn reader(&self) -> SurfaceReader {
        self.surface.reader()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.get()
    }

    pub fn subscribe_faults(&self) -> broadcast::Receiver<EngineFault> {
        self.faults.subscribe()
    }

    pub fn route(&self) -> OutputRoute {
        self.control.route.get()
    }

    pub fn health_state(&self) -> HealthState {
        self.watchdog
            .as_ref()
            .map_or(HealthState::Idle, Watchdog::state)
    }

    pub fn subscribe_health(&self) -> Option<broadcast::Receiver<HealthEvent>> {
        self.watchdog.as_ref().map(Watchdog::subscribe)
    }

    /// Leave fallback: restore the compositor and re-arm the watchdog.
    pub fn reinitialize(&self) {
        match &self.watchdog {
            Some(watchdog) => watchdog.reinitialize(),
            None => tracing::warn!("engine is shut down; reinitialize ignored"),
        }
    }

    pub fn distributor(&self) -> &FrameDistributor {
        &self.distributor
    }

    pub fn distributor_mut(&mut self) -> &mut FrameDistributor {
        &mut self.distributor
    }

    pub fn is_running(&self) -> bool {
        self.render_loop.as_ref().is_some_and(RenderLoop::is_running)
    }

    /// Stop transports, background tasks and the render thread, in that
    /// order. No tick runs after this returns. Idempotent.
    pub fn shutdown(&mut self) {
        if self.render_loop.is_none() {
            return;
        }
        self.distributor.stop();
        self.watchdog = None;
        self.mask_pump = None;
        if let Some(mut render_loop) = self.render_loop.take() {
            render_loop.stop();
        }
        tracing::info!("engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
