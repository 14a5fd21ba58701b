//! Per-point exponential smoothing of landmarks in pixel space.

use glam::Vec2;

/// Default blend factor toward the new sample.
pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.3;

/// Holds the previous frame's smoothed points.
///
/// `smoothed = prev + (raw - prev) * factor`. State is dropped whenever the
/// target dimensions or the point count change, and on [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct LandmarkSmoother {
    factor: f32,
    dims: (u32, u32),
    points: Vec<Vec2>,
}

impl LandmarkSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.1, 1.0),
            dims: (0, 0),
            points: Vec::new(),
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Blend `raw` into the state and return the smoothed points.
    pub fn smooth(&mut self, raw: &[Vec2], width: u32, height: u32) -> &[Vec2] {
        if self.dims != (width, height) || self.points.len() != raw.len() {
            self.dims = (width, height);
            self.points.clear();
            self.points.extend_from_slice(raw);
            return &self.points;
        }

        let factor = self.factor;
        for (prev, new) in self.points.iter_mut().zip(raw) {
            *prev += (*new - *prev) * factor;
        }
        &self.points
    }

    /// Forget the history. Calling it twice is the same as calling it once.
    pub fn reset(&mut self) {
        self.dims = (0, 0);
        self.points.clear();
    }

    pub fn is_primed(&self) -> bool {
        !self.points.is_empty()
    }
}

impl Default for LandmarkSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR)
    }
}
