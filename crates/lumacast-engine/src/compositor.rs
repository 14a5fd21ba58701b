//! The per-tick compositor and its lifecycle state machine.
//!
//! ```text
//! Uninitialized → Initializing → Ready ⇄ Rendering
//!                                  ↓
//!                             ContextLost → Ready (restore) | Disposed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use lumacast_core::render::{RenderBackend, RenderInputs, RenderedFrame};
use lumacast_core::scopes::{self, ScopeOverlay};
use lumacast_core::{
    BackendError, EngineStats, FrameClock, LutStore, OutputSurface, SnapshotStore, StatsCell,
    VideoSource,
};

use crate::faults::{EngineFault, FaultBus};
use crate::landmarks::MaskSlot;

/// Consecutive failed renders before `RenderStalled` is published.
pub const STALL_THRESHOLD: u32 = 10;

const RESTORE_BACKOFF_MIN: Duration = Duration::from_millis(250);
const RESTORE_BACKOFF_MAX: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    Uninitialized,
    Initializing,
    Ready,
    Rendering,
    ContextLost,
    Disposed,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No new video frame, or not ready to draw.
    Skipped,
    /// A frame was presented with this surface version.
    Presented { version: u64 },
    /// Work was submitted; its result arrives on a later tick.
    Pending,
    /// The backend lost its context during this tick.
    ContextLost,
    /// The context came back this tick.
    Restored,
    /// The backend reported a non-loss error.
    Failed(BackendError),
    /// Called after `dispose`.
    Disposed,
}

/// Everything the compositor reads from or writes to, shared with the
/// rest of the engine.
#[derive(Clone)]
pub struct CompositorLinks {
    pub source: Arc<dyn VideoSource>,
    pub snapshots: Arc<SnapshotStore>,
    pub luts: Arc<LutStore>,
    pub masks: MaskSlot,
    pub surface: Arc<OutputSurface>,
    pub stats: Arc<StatsCell>,
    pub faults: FaultBus,
}

pub struct Compositor {
    backend: Box<dyn RenderBackend>,
    links: CompositorLinks,
    state: CompositorState,
    clock: FrameClock,
    /// Sequence of the last video frame handed to the backend.
    last_sequence: Option<u64>,
    frame_index: u32,
    /// Scopes of the previous output for Histogram/RgbParade.
    scopes: Option<ScopeOverlay>,
    mask_staleness: u64,
    consecutive_failures: u32,
    restore_backoff: Duration,
    next_restore: Option<Instant>,
}

impl Compositor {
    pub fn new(
        backend: Box<dyn RenderBackend>,
        links: CompositorLinks,
        refresh_hz: f32,
        mask_staleness: u64,
    ) -> Self {
        Self {
            backend,
            links,
            state: CompositorState::Uninitialized,
            clock: FrameClock::new(refresh_hz),
            last_sequence: None,
            frame_index: 0,
            scopes: None,
            mask_staleness,
            consecutive_failures: 0,
            restore_backoff: RESTORE_BACKOFF_MIN,
            next_restore: None,
        }
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn stats(&self, now: Instant) -> EngineStats {
        self.clock.stats(now)
    }

    pub fn links(&self) -> &CompositorLinks {
        &self.links
    }

    /// Acquire backend resources and move to `Ready`.
    pub fn initialize(&mut self) -> Result<(), BackendError> {
        match self.state {
            CompositorState::Uninitialized => {}
            CompositorState::Disposed => {
                debug_assert!(false, "initialize after dispose");
                tracing::error!("initialize after dispose ignored");
                return Err(BackendError::NotAcquired);
            }
            _ => return Ok(()),
        }
        self.state = CompositorState::Initializing;
        match self.backend.acquire() {
            Ok(()) => {
                self.state = CompositorState::Ready;
                tracing::info!("compositor ready on {} backend", self.backend.name());
                Ok(())
            }
            Err(e) => {
                self.state = CompositorState::Uninitialized;
                tracing::error!("compositor initialization failed: {e}");
                Err(e)
            }
        }
    }

    /// One display-refresh tick.
    ///
    /// Never returns an error: failures are logged, reported on the fault
    /// bus and reflected in the outcome. Stats are republished on every
    /// tick so the rate falls off while nothing is presented.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let outcome = self.advance(now);
        if outcome != TickOutcome::Disposed {
            self.publish_stats(now);
        }
        outcome
    }

    /// Push the current rolling stats to the shared cell.
    pub fn publish_stats(&self, now: Instant) {
        self.links.stats.publish(self.clock.stats(now));
    }

    fn advance(&mut self, now: Instant) -> TickOutcome {
        match self.state {
            CompositorState::Disposed => {
                debug_assert!(false, "tick after dispose");
                tracing::error!("tick after dispose ignored");
                return TickOutcome::Disposed;
            }
            CompositorState::ContextLost => {
                if self.next_restore.is_some_and(|at| now >= at) && self.restore(now).is_ok() {
                    return TickOutcome::Restored;
                }
                return TickOutcome::Skipped;
            }
            CompositorState::Uninitialized | CompositorState::Initializing => {
                return TickOutcome::Skipped;
            }
            CompositorState::Ready | CompositorState::Rendering => {}
        }

        if self.backend.is_context_lost() {
            self.enter_context_lost(now);
            return TickOutcome::ContextLost;
        }

        let Some(frame) = self.links.source.latest_frame() else {
            return TickOutcome::Skipped;
        };
        if self.last_sequence == Some(frame.sequence) {
            return TickOutcome::Skipped;
        }

        self.state = CompositorState::Rendering;
        let snapshot = self.links.snapshots.snapshot();
        let lut = self.links.luts.active();
        let masks = self.links.masks.fresh(frame.sequence, self.mask_staleness);
        let scopes = self
            .scopes
            .as_ref()
            .filter(|_| snapshot.render_mode.needs_scopes());

        let result = self.backend.render(&RenderInputs {
            frame: &frame,
            snapshot: &snapshot,
            lut: lut.as_ref(),
            masks: masks.as_ref(),
            scopes,
            frame_index: self.frame_index,
        });
        self.last_sequence = Some(frame.sequence);
        self.frame_index = self.frame_index.wrapping_add(1);
        self.state = CompositorState::Ready;

        match result {
            Ok(Some(RenderedFrame { image, source_sequence })) => {
                self.consecutive_failures = 0;
                let (width, height) = image.dimensions();
                self.scopes = snapshot
                    .render_mode
                    .needs_scopes()
                    .then(|| scopes::compute(&image));
                let version = self.links.surface.present(image, source_sequence, false);
                self.clock.record(now, width, height);
                TickOutcome::Presented { version }
            }
            Ok(None) => {
                self.consecutive_failures = 0;
                TickOutcome::Pending
            }
            Err(BackendError::ContextLost) => {
                self.enter_context_lost(now);
                TickOutcome::ContextLost
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::warn!("render failed ({} in a row): {e}", self.consecutive_failures);
                if self.consecutive_failures == STALL_THRESHOLD {
                    self.links.faults.publish(EngineFault::RenderStalled {
                        consecutive_failures: self.consecutive_failures,
                    });
                }
                TickOutcome::Failed(e)
            }
        }
    }

    /// Re-acquire backend resources after a context loss.
    ///
    /// On failure the next automatic attempt is pushed back exponentially.
    pub fn restore(&mut self, now: Instant) -> Result<(), BackendError> {
        if self.state != CompositorState::ContextLost {
            return Ok(());
        }
        self.backend.release();
        match self.backend.acquire() {
            Ok(()) => {
                self.state = CompositorState::Ready;
                self.restore_backoff = RESTORE_BACKOFF_MIN;
                self.next_restore = None;
                self.last_sequence = None;
                self.scopes = None;
                tracing::info!("{} context restored", self.backend.name());
                self.links.faults.publish(EngineFault::ContextRestored {
                    backend: self.backend.name(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "context restore failed: {e}; retrying in {} ms",
                    self.restore_backoff.as_millis()
                );
                self.next_restore = Some(now + self.restore_backoff);
                self.restore_backoff = (self.restore_backoff * 2).min(RESTORE_BACKOFF_MAX);
                Err(e)
            }
        }
    }

    /// Release resources. Terminal; idempotent.
    pub fn dispose(&mut self) {
        if self.state == CompositorState::Disposed {
            return;
        }
        self.backend.release();
        self.state = CompositorState::Disposed;
        tracing::debug!("compositor disposed");
    }

    fn enter_context_lost(&mut self, now: Instant) {
        self.state = CompositorState::ContextLost;
        self.next_restore = Some(now + self.restore_backoff);
        tracing::warn!("{} context lost; drawing halted", self.backend.name());
        self.links.faults.publish(EngineFault::ContextLost {
            backend: self.backend.name(),
        });
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use image::{Rgba, RgbaImage};
    use lumacast_core::{CpuBackend, FrameSlot, RenderMode};

    fn links(source: Arc<FrameSlot>) -> CompositorLinks {
        CompositorLinks {
            source,
            snapshots: Arc::new(SnapshotStore::default()),
            luts: Arc::new(LutStore::with_files()),
            masks: MaskSlot::new(),
            surface: OutputSurface::new(),
            stats: Arc::new(StatsCell::default()),
            faults: FaultBus::new(),
        }
    }

    fn grey(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 6, Rgba([v, v, v, 255]))
    }

    struct FailingBackend;

    impl RenderBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn acquire(&mut self) -> Result<(), BackendError> {
            Ok(())
        }
        fn release(&mut self) {}
        fn is_context_lost(&self) -> bool {
            false
        }
        fn render(&mut self, _: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
            Err(BackendError::Render("shader exploded".into()))
        }
    }

    /// Hands back the previous call's frame, like a pipelined readback.
    #[derive(Default)]
    struct LaggingBackend {
        in_flight: Option<RenderedFrame>,
    }

    impl RenderBackend for LaggingBackend {
        fn name(&self) -> &'static str {
            "lagging"
        }
        fn acquire(&mut self) -> Result<(), BackendError> {
            Ok(())
        }
        fn release(&mut self) {}
        fn is_context_lost(&self) -> bool {
            false
        }
        fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
            let submitted = RenderedFrame {
                image: Arc::clone(&inputs.frame.image),
                source_sequence: inputs.frame.sequence,
            };
            Ok(self.in_flight.replace(submitted))
        }
    }

    #[test]
    fn test_lifecycle_and_skip_without_new_frame() {
        let source = Arc::new(FrameSlot::new());
        let mut compositor = Compositor::new(Box::new(CpuBackend::new()), links(source.clone()), 60.0, 5);
        let now = Instant::now();
        assert_eq!(compositor.state(), CompositorState::Uninitialized);
        assert_eq!(compositor.tick(now), TickOutcome::Skipped);

        compositor.initialize().unwrap();
        assert_eq!(compositor.state(), CompositorState::Ready);
        assert_eq!(compositor.tick(now), TickOutcome::Skipped, "no frame yet");

        source.push(grey(100));
        assert_eq!(compositor.tick(now), TickOutcome::Presented { version: 1 });
        assert_eq!(compositor.tick(now), TickOutcome::Skipped, "same frame");
        assert_eq!(compositor.state(), CompositorState::Ready);

        source.push(grey(110));
        assert!(matches!(compositor.tick(now + Duration::from_millis(16)), TickOutcome::Presented { .. }));
        let frame = compositor.links().surface.latest().unwrap();
        assert_eq!(frame.source_sequence, 2);
        assert!(!frame.passthrough);
    }

    #[test]
    fn test_stats_published_after_draws() {
        let source = Arc::new(FrameSlot::new());
        let links = links(source.clone());
        let stats = Arc::clone(&links.stats);
        let mut compositor = Compositor::new(Box::new(CpuBackend::new()), links, 60.0, 5);
        compositor.initialize().unwrap();

        let start = Instant::now();
        for i in 0..10u64 {
            source.push(grey(50));
            compositor.tick(start + Duration::from_millis(i * 16));
        }
        let s = stats.get();
        assert_eq!(s.resolution, "8x6");
        assert!((s.fps - 62.5).abs() < 0.5, "fps {}", s.fps);
        assert_eq!(s.dropped_frames, 0);
    }

    #[test]
    fn test_stats_fall_to_zero_once_drawing_stops() {
        let source = Arc::new(FrameSlot::new());
        let links = links(source.clone());
        let stats = Arc::clone(&links.stats);
        let backend = CpuBackend::new();
        let trigger = backend.loss_trigger();
        let mut compositor = Compositor::new(Box::new(backend), links, 60.0, 5);
        compositor.initialize().unwrap();

        let start = Instant::now();
        for i in 0..10u64 {
            source.push(grey(50));
            compositor.tick(start + Duration::from_millis(i * 16));
        }
        assert!(stats.get().fps > 0.0);

        trigger.store(true, Ordering::Release);
        source.push(grey(51));
        assert_eq!(compositor.tick(start + Duration::from_millis(200)), TickOutcome::ContextLost);
        compositor.tick(start + Duration::from_millis(1500));
        let s = stats.get();
        assert_eq!(s.fps, 0.0, "no presented frame in the last second");
        assert_eq!(s.resolution, "8x6");
    }

    #[test]
    fn test_pipelined_output_keeps_its_source_sequence() {
        let source = Arc::new(FrameSlot::new());
        let mut compositor = Compositor::new(Box::<LaggingBackend>::default(), links(source.clone()), 60.0, 5);
        compositor.initialize().unwrap();
        let now = Instant::now();

        source.push(grey(10));
        assert_eq!(compositor.tick(now), TickOutcome::Pending);
        source.push(grey(20));
        assert!(matches!(compositor.tick(now), TickOutcome::Presented { .. }));

        let frame = compositor.links().surface.latest().unwrap();
        assert_eq!(frame.source_sequence, 1, "surface carries the drawn frame's sequence");
        assert_eq!(frame.image.get_pixel(0, 0).0[0], 10);
    }

    #[test]
    fn test_context_loss_halts_and_restore_resumes() {
        let source = Arc::new(FrameSlot::new());
        let links = links(source.clone());
        let mut faults = links.faults.subscribe();
        let snapshots = Arc::clone(&links.snapshots);
        let backend = CpuBackend::new();
        let trigger = backend.loss_trigger();
        let mut compositor = Compositor::new(Box::new(backend), links, 60.0, 5);
        compositor.initialize().unwrap();
        snapshots.set_render_mode(RenderMode::Zebras);

        let now = Instant::now();
        source.push(grey(90));
        compositor.tick(now);

        trigger.store(true, Ordering::Release);
        source.push(grey(91));
        assert_eq!(compositor.tick(now), TickOutcome::ContextLost);
        assert_eq!(compositor.state(), CompositorState::ContextLost);
        assert_eq!(faults.try_recv().unwrap(), EngineFault::ContextLost { backend: "cpu" });

        source.push(grey(92));
        assert_eq!(compositor.tick(now), TickOutcome::Skipped, "drawing halted");

        compositor.restore(now).unwrap();
        assert_eq!(compositor.state(), CompositorState::Ready);
        assert_eq!(faults.try_recv().unwrap(), EngineFault::ContextRestored { backend: "cpu" });
        assert_eq!(snapshots.snapshot().render_mode, RenderMode::Zebras, "snapshots unaffected");
        assert!(matches!(compositor.tick(now), TickOutcome::Presented { .. }));
    }

    #[test]
    fn test_lost_context_restores_automatically_after_backoff() {
        let source = Arc::new(FrameSlot::new());
        let backend = CpuBackend::new();
        let trigger = backend.loss_trigger();
        let mut compositor = Compositor::new(Box::new(backend), links(source.clone()), 60.0, 5);
        compositor.initialize().unwrap();

        let now = Instant::now();
        trigger.store(true, Ordering::Release);
        source.push(grey(10));
        assert_eq!(compositor.tick(now), TickOutcome::ContextLost);
        assert_eq!(compositor.tick(now + Duration::from_millis(100)), TickOutcome::Skipped);
        assert_eq!(compositor.tick(now + RESTORE_BACKOFF_MIN), TickOutcome::Restored);
        assert!(matches!(
            compositor.tick(now + RESTORE_BACKOFF_MIN),
            TickOutcome::Presented { .. }
        ));
    }

    #[test]
    fn test_repeated_failures_publish_stall_once() {
        let source = Arc::new(FrameSlot::new());
        let links = links(source.clone());
        let mut faults = links.faults.subscribe();
        let mut compositor = Compositor::new(Box::new(FailingBackend), links, 60.0, 5);
        compositor.initialize().unwrap();

        let now = Instant::now();
        for _ in 0..STALL_THRESHOLD + 5 {
            source.push(grey(1));
            assert!(matches!(compositor.tick(now), TickOutcome::Failed(_)));
        }
        assert_eq!(
            faults.try_recv().unwrap(),
            EngineFault::RenderStalled { consecutive_failures: STALL_THRESHOLD }
        );
        assert!(faults.try_recv().is_err());
    }

    #[test]
    fn test_scopes_follow_previous_output() {
        let source = Arc::new(FrameSlot::new());
        let links = links(source.clone());
        let snapshots = Arc::clone(&links.snapshots);
        let mut compositor = Compositor::new(Box::new(CpuBackend::new()), links, 60.0, 5);
        compositor.initialize().unwrap();
        let now = Instant::now();

        source.push(grey(128));
        compositor.tick(now);
        assert!(compositor.scopes.is_none(), "standard mode keeps no scopes");

        snapshots.set_render_mode(RenderMode::Histogram);
        source.push(grey(128));
        compositor.tick(now);
        assert!(compositor.scopes.is_some());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let source = Arc::new(FrameSlot::new());
        let mut compositor = Compositor::new(Box::new(CpuBackend::new()), links(source), 60.0, 5);
        compositor.initialize().unwrap();
        compositor.dispose();
        compositor.dispose();
        assert_eq!(compositor.state(), CompositorState::Disposed);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "tick after dispose")]
    fn test_tick_after_dispose_panics_in_debug() {
        let source = Arc::new(FrameSlot::new());
        let mut compositor = Compositor::new(Box::new(CpuBackend::new()), links(source), 60.0, 5);
        compositor.dispose();
        compositor.tick(Instant::now());
    }
}
