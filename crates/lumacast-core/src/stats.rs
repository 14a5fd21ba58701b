//! Rolling frame statistics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Snapshot of compositor performance, polled by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStats {
    /// Frames per second over the last second.
    pub fps: f32,
    /// Mean interval between presented frames, in milliseconds.
    pub frame_time_ms: f32,
    /// Gaps longer than twice the nominal interval.
    pub dropped_frames: u64,
    /// `"WxH"` of the last presented frame.
    pub resolution: String,
}

const WINDOW: Duration = Duration::from_secs(1);

/// Records successful draws and derives [`EngineStats`].
#[derive(Debug)]
pub struct FrameClock {
    nominal: Duration,
    stamps: VecDeque<Instant>,
    dropped: u64,
    resolution: (u32, u32),
}

impl FrameClock {
    /// `refresh_hz` sets the nominal interval used for drop detection.
    pub fn new(refresh_hz: f32) -> Self {
        let hz = if refresh_hz > 0.0 { refresh_hz } else { 60.0 };
        Self {
            nominal: Duration::from_secs_f32(1.0 / hz),
            stamps: VecDeque::new(),
            dropped: 0,
            resolution: (0, 0),
        }
    }

    pub fn nominal_interval(&self) -> Duration {
        self.nominal
    }

    /// Note a presented frame at `now`.
    pub fn record(&mut self, now: Instant, width: u32, height: u32) {
        if let Some(last) = self.stamps.back() {
            if now.saturating_duration_since(*last) > self.nominal * 2 {
                self.dropped += 1;
            }
        }
        self.stamps.push_back(now);
        while let Some(first) = self.stamps.front() {
            if now.saturating_duration_since(*first) > WINDOW {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        self.resolution = (width, height);
    }

    /// Rates over the frames presented within one second of `now`.
    ///
    /// Once presentation stops the rate falls to zero as the stamps age
    /// out of the window.
    pub fn stats(&self, now: Instant) -> EngineStats {
        let mut live = self
            .stamps
            .iter()
            .skip_while(|t| now.saturating_duration_since(**t) > WINDOW);
        let (fps, frame_time_ms) = match (live.next(), self.stamps.back()) {
            (Some(first), Some(last)) => {
                let gaps = live.count() as f32;
                let span = last.saturating_duration_since(*first).as_secs_f32();
                if gaps > 0.0 && span > 0.0 {
                    (gaps / span, span * 1000.0 / gaps)
                } else {
                    (0.0, 0.0)
                }
            }
            _ => (0.0, 0.0),
        };
        EngineStats {
            fps,
            frame_time_ms,
            dropped_frames: self.dropped,
            resolution: format!("{}x{}", self.resolution.0, self.resolution.1),
        }
    }

    pub fn reset(&mut self) {
        self.stamps.clear();
        self.dropped = 0;
    }
}

/// Shared, lock-protected latest stats.
#[derive(Debug, Default)]
pub struct StatsCell {
    inner: RwLock<EngineStats>,
}

impl StatsCell {
    pub fn publish(&self, stats: EngineStats) {
        *self.inner.write() = stats;
    }

    pub fn get(&self) -> EngineStats {
        self.inner.read().clone()
    }
}
