//! Procedural LUT generation.

use super::LutData;

/// Rec. 709 luminance weights.
const LUMA_REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Warm-highlight / cool-shadow push of the teal & orange look.
const TEAL_ORANGE_AMOUNT: f32 = 0.1;

/// Passthrough grade: voxel `(i, j, k)` stores `(k, j, i) / (size - 1)`.
///
/// `size` below 2 is raised to 2.
pub fn generate_identity(size: u32) -> LutData {
    let size = size.max(2);
    let n = size as usize;
    let scale = (n - 1) as f32;
    let mut data = Vec::with_capacity(n * n * n * 3);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                data.push(k as f32 / scale);
                data.push(j as f32 / scale);
                data.push(i as f32 / scale);
            }
        }
    }
    LutData {
        name: "Identity".to_string(),
        size,
        data,
    }
}

/// Teal & orange look derived from the identity table.
///
/// Red is boosted in proportion to luma (warm highlights) and blue in
/// proportion to `1 - luma` (cool shadows).
pub fn generate_teal_orange(size: u32) -> LutData {
    let mut lut = generate_identity(size);
    lut.name = "Teal & Orange".to_string();
    for px in lut.data.chunks_exact_mut(3) {
        let luma = px[0] * LUMA_REC709[0] + px[1] * LUMA_REC709[1] + px[2] * LUMA_REC709[2];
        px[0] = (px[0] + luma * TEAL_ORANGE_AMOUNT).clamp(0.0, 1.0);
        px[2] = (px[2] + (1.0 - luma) * TEAL_ORANGE_AMOUNT).clamp(0.0, 1.0);
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_voxel_ordering() {
        let lut = generate_identity(3);
        assert_eq!(lut.data.len(), 27 * 3);
        // Second entry in file order steps red, not blue.
        assert_eq!(&lut.data[3..6], &[0.5, 0.0, 0.0]);
        assert_eq!(lut.voxel(0, 0, 2), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_teal_orange_warms_highlights_and_cools_shadows() {
        let lut = generate_teal_orange(9);
        let white = lut.voxel(8, 8, 8);
        let black = lut.voxel(0, 0, 0);
        assert_eq!(white[0], 1.0);
        assert!((black[2] - TEAL_ORANGE_AMOUNT).abs() < 1e-6);
        let mid = lut.voxel(4, 4, 4);
        assert!(mid[0] > 0.5 && mid[2] > 0.5);
    }

    #[test]
    fn test_size_below_two_is_raised() {
        assert_eq!(generate_identity(0).size, 2);
    }
}
