//! Dedicated render thread ticking the compositor at the display rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumacast_core::{OutputSurface, VideoSource};

use crate::compositor::{Compositor, CompositorState, TickOutcome};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// What the render loop publishes to the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputRoute {
    /// Composited frames from the backend.
    Composited = 0,
    /// Raw video, used while the health monitor is in fallback.
    RawPassthrough = 1,
}

/// Route shared between the render thread and the watchdog.
#[derive(Debug, Clone)]
pub struct SharedRoute(Arc<AtomicU8>);

impl SharedRoute {
    pub fn new(route: OutputRoute) -> Self {
        Self(Arc::new(AtomicU8::new(route as u8)))
    }

    pub fn get(&self) -> OutputRoute {
        match self.0.load(Ordering::Acquire) {
            1 => OutputRoute::RawPassthrough,
            _ => OutputRoute::Composited,
        }
    }

    /// Returns the previous route.
    pub fn set(&self, route: OutputRoute) -> OutputRoute {
        match self.0.swap(route as u8, Ordering::AcqRel) {
            1 => OutputRoute::RawPassthrough,
            _ => OutputRoute::Composited,
        }
    }
}

impl Default for SharedRoute {
    fn default() -> Self {
        Self::new(OutputRoute::Composited)
    }
}

/// Flags the render thread checks between ticks.
#[derive(Debug, Clone, Default)]
pub struct LoopControl {
    should_stop: Arc<AtomicBool>,
    restore_requested: Arc<AtomicBool>,
    pub route: SharedRoute,
}

impl LoopControl {
    /// Ask the loop to re-acquire a lost context on its next tick.
    pub fn request_restore(&self) {
        self.restore_requested.store(true, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }
}

/// Owns the render thread. Dropping it stops the thread and disposes the
/// compositor.
pub struct RenderLoop {
    control: LoopControl,
    thread: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Initialize `compositor` on a new thread and tick it at `refresh_hz`.
    pub fn spawn(
        compositor: Compositor,
        refresh_hz: f32,
        control: LoopControl,
    ) -> std::io::Result<Self> {
        let interval = Duration::from_secs_f32(1.0 / refresh_hz.max(1.0));
        let thread_control = control.clone();
        let thread = thread::Builder::new()
            .name("lumacast-render".to_string())
            .spawn(move || run_loop(compositor, interval, thread_control))?;
        tracing::info!("render loop started at {:.0} Hz", refresh_hz);
        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    pub fn control(&self) -> &LoopControl {
        &self.control
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop and join the render thread. Idempotent.
    pub fn stop(&mut self) {
        self.control.should_stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("render thread panicked");
            } else {
                tracing::info!("render loop stopped");
            }
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut compositor: Compositor, interval: Duration, control: LoopControl) {
    if let Err(e) = compositor.initialize() {
        tracing::error!("compositor failed to initialize: {e}");
    }
    let source = Arc::clone(&compositor.links().source);
    let surface = Arc::clone(&compositor.links().surface);
    let mut last_passthrough = None;
    let mut last_stats_log = Instant::now();
    let mut next_tick = Instant::now();

    while !control.is_stopping() {
        let now = Instant::now();

        if control.restore_requested.swap(false, Ordering::AcqRel) {
            match compositor.state() {
                CompositorState::ContextLost => {
                    let _ = compositor.restore(now);
                }
                CompositorState::Uninitialized => {
                    let _ = compositor.initialize();
                }
                _ => {}
            }
        }

        match control.route.get() {
            OutputRoute::Composited => {
                last_passthrough = None;
                if let TickOutcome::Failed(e) = compositor.tick(now) {
                    tracing::trace!("tick failed: {e}");
                }
            }
            OutputRoute::RawPassthrough => {
                last_passthrough = present_raw(source.as_ref(), &surface, last_passthrough);
                compositor.publish_stats(now);
            }
        }

        if now.saturating_duration_since(last_stats_log) >= STATS_LOG_INTERVAL {
            last_stats_log = now;
            let stats = compositor.stats(now);
            tracing::debug!(
                fps = stats.fps,
                frame_time_ms = stats.frame_time_ms,
                dropped = stats.dropped_frames,
                resolution = %stats.resolution,
                "render stats"
            );
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Fell behind; don't try to catch up with a burst of ticks.
            next_tick = now;
        }
    }

    compositor.dispose();
}

/// Publish the raw video frame if it is newer than `last`.
fn present_raw(
    source: &dyn VideoSource,
    surface: &OutputSurface,
    last: Option<u64>,
) -> Option<u64> {
    let Some(frame) = source.latest_frame() else {
        return last;
    };
    if last == Some(frame.sequence) {
        return last;
    }
    surface.present(frame.image, frame.sequence, true);
    Some(frame.sequence)
}
