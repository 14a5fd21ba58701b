//! 3D lookup tables: generation, `.cube` I/O, trilinear sampling and caching.
//!
//! Voxel order is shared by every producer and consumer in the crate: the
//! flattened index of voxel `(i, j, k)` is `(i * N + j) * N + k` and it stores
//! the color `(k, j, i) / (N - 1)` for the identity table. Red (`k`) varies
//! fastest, which is also the order entries appear in a `.cube` file and the
//! x axis of the GPU 3D texture.

pub mod cache;
pub mod cube;
pub mod generate;
pub mod store;

pub use cache::LutCache;
pub use cube::parse_cube;
pub use generate::{generate_identity, generate_teal_orange};
pub use store::{FileFetcher, LutFetcher, LutStore};

/// Largest accepted cube size.
pub const MAX_LUT_SIZE: u32 = 256;

/// A parsed or generated 3D LUT.
#[derive(Debug, Clone, PartialEq)]
pub struct LutData {
    /// Display name (from `TITLE` or the source identifier).
    pub name: String,
    /// Grid size per axis, at least 2.
    pub size: u32,
    /// `size³ × 3` floats in `[0, 1]`, red fastest.
    pub data: Vec<f32>,
}

impl LutData {
    /// Number of voxels (`size³`).
    pub fn voxel_count(&self) -> usize {
        (self.size as usize).pow(3)
    }

    /// Color stored at voxel `(r, g, b)` grid coordinates.
    pub fn voxel(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        let n = self.size as usize;
        let idx = ((b * n + g) * n + r) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Sample the table with trilinear interpolation. Input is clamped to `[0, 1]`.
    ///
    /// The composite shader's `sample_lut` mirrors this exactly.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let n = self.size as usize;
        let scale = (n - 1) as f32;

        let mut base = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for c in 0..3 {
            let x = rgb[c].clamp(0.0, 1.0) * scale;
            let i = (x.floor() as usize).min(n - 2);
            base[c] = i;
            frac[c] = x - i as f32;
        }

        let mut out = [0.0f32; 3];
        for corner in 0..8 {
            let dr = corner & 1;
            let dg = (corner >> 1) & 1;
            let db = (corner >> 2) & 1;
            let weight = axis_weight(frac[0], dr)
                * axis_weight(frac[1], dg)
                * axis_weight(frac[2], db);
            if weight == 0.0 {
                continue;
            }
            let v = self.voxel(base[0] + dr, base[1] + dg, base[2] + db);
            for c in 0..3 {
                out[c] += v[c] * weight;
            }
        }
        out
    }
}

fn axis_weight(frac: f32, upper: usize) -> f32 {
    if upper == 1 { frac } else { 1.0 - frac }
}
