//! Luma histogram and RGB parade for the annotation overlays.
//!
//! Scopes are computed from the previous output frame and drawn into the
//! next one, so the overlay lags by exactly one frame.

use image::RgbaImage;

use crate::color::luma;

/// Parade columns per channel.
pub const SCOPE_COLUMNS: u32 = 64;
/// Intensity levels (histogram bins and parade rows).
pub const SCOPE_LEVELS: u32 = 64;

/// Upper bound on sampled pixels per frame.
const MAX_SAMPLES: u32 = 65_536;

/// Normalized scope data, each value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeOverlay {
    pub columns: u32,
    pub levels: u32,
    /// Luma histogram, `levels` bins, dark to bright.
    pub histogram: Vec<f32>,
    /// Density per `(channel, column, level)`, row-major in that order.
    pub parade: Vec<f32>,
}

impl ScopeOverlay {
    pub fn empty() -> Self {
        Self {
            columns: SCOPE_COLUMNS,
            levels: SCOPE_LEVELS,
            histogram: vec![0.0; SCOPE_LEVELS as usize],
            parade: vec![0.0; (3 * SCOPE_COLUMNS * SCOPE_LEVELS) as usize],
        }
    }

    /// Flatten into the storage-buffer layout: histogram, then parade.
    pub fn to_buffer(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.histogram.len() + self.parade.len());
        out.extend_from_slice(&self.histogram);
        out.extend_from_slice(&self.parade);
        out
    }

    /// Histogram bin height.
    pub fn histogram_at(&self, level: u32) -> f32 {
        self.histogram.get(level as usize).copied().unwrap_or(0.0)
    }

    /// Parade density for channel `ch` at `(column, level)`.
    pub fn parade_at(&self, ch: usize, column: u32, level: u32) -> f32 {
        let idx = (ch as u32 * self.columns + column) * self.levels + level;
        self.parade.get(idx as usize).copied().unwrap_or(0.0)
    }
}

/// Compute histogram and parade from an 8-bit frame.
pub fn compute(image: &RgbaImage) -> ScopeOverlay {
    let mut scopes = ScopeOverlay::empty();
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return scopes;
    }

    let total = width.saturating_mul(height);
    let stride = ((total / MAX_SAMPLES) as f32).sqrt().ceil().max(1.0) as u32;
    let levels = SCOPE_LEVELS as f32;
    let cols = SCOPE_COLUMNS;

    let mut hist = vec![0u32; SCOPE_LEVELS as usize];
    let mut parade = vec![0u32; scopes.parade.len()];

    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            let p = image.get_pixel(x, y).0;
            let rgb = [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0];

            let level = |v: f32| ((v * levels) as u32).min(SCOPE_LEVELS - 1);
            hist[level(luma(rgb)) as usize] += 1;

            let column = (x as u64 * cols as u64 / width as u64) as u32;
            for (ch, v) in rgb.iter().enumerate() {
                let idx = (ch as u32 * cols + column) * SCOPE_LEVELS + level(*v);
                parade[idx as usize] += 1;
            }
        }
    }

    normalize(&hist, &mut scopes.histogram);
    normalize(&parade, &mut scopes.parade);
    scopes
}

fn normalize(counts: &[u32], out: &mut [f32]) {
    let peak = counts.iter().copied().max().unwrap_or(0);
    if peak == 0 {
        return;
    }
    for (dst, c) in out.iter_mut().zip(counts) {
        *dst = *c as f32 / peak as f32;
    }
}
