//! Per-dispatch uniform block for `composite.wgsl`.

use bytemuck::{Pod, Zeroable};

use lumacast_core::render::StageParams;
use lumacast_core::scopes::ScopeOverlay;

/// Mirrors `struct Uniforms` in the shader: 17 × vec4, 272 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub uv_row0: [f32; 4],
    pub uv_row1: [f32; 4],
    pub lift: [f32; 4],
    pub gamma: [f32; 4],
    pub gain: [f32; 4],
    pub wb_row0: [f32; 4],
    pub wb_row1: [f32; 4],
    pub wb_row2: [f32; 4],
    pub tone: [f32; 4],
    pub detail: [f32; 4],
    pub optics: [f32; 4],
    pub beauty_a: [f32; 4],
    pub beauty_b: [f32; 4],
    pub anchor: [f32; 4],
    pub features: [f32; 4],
    pub flags: [u32; 4],
    pub scope: [u32; 4],
}

pub const UNIFORM_SIZE: u64 = std::mem::size_of::<CompositeUniforms>() as u64;

impl CompositeUniforms {
    /// Pack stage parameters. `lut_size` is 0 when no LUT is bound.
    pub fn new(p: &StageParams, lut_size: u32, scopes: Option<&ScopeOverlay>) -> Self {
        let t = p.uv_transform;
        let g = &p.grade;
        let b = &p.beauty;
        let wb = p.white_balance;
        let row = |r: [f32; 3]| [r[0], r[1], r[2], 0.0];

        let (anchor, features, active) = match &p.anchor {
            Some(a) => (
                [a.center.x, a.center.y, a.width, 0.0],
                [a.lips.x, a.lips.y, a.nose.x, a.nose.y],
                1.0,
            ),
            None => ([0.0; 4], [0.0; 4], 0.0),
        };
        let scope = match scopes {
            Some(s) => [s.columns.max(1), s.levels.max(1), 1, 0],
            None => [1, 1, 0, 0],
        };

        Self {
            uv_row0: [t.matrix2.x_axis.x, t.matrix2.y_axis.x, t.translation.x, 0.0],
            uv_row1: [t.matrix2.x_axis.y, t.matrix2.y_axis.y, t.translation.y, 0.0],
            lift: g.lift,
            gamma: g.gamma,
            gain: g.gain,
            wb_row0: row(wb[0]),
            wb_row1: row(wb[1]),
            wb_row2: row(wb[2]),
            tone: [g.exposure, g.saturation, g.contrast, g.lut_strength],
            detail: [g.sharpness, g.denoise, g.grain, g.vignette],
            optics: [g.distortion, g.portrait_light, p.orientation_deg, p.aspect()],
            beauty_a: [b.smooth, b.eye_brighten, b.face_thin, b.skin_tone],
            beauty_b: [b.cheekbones, b.lips_fuller, b.nose_slim, active],
            anchor,
            features,
            flags: [p.mode.to_u32(), p.bypass as u32, lut_size, p.frame_index],
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use lumacast_core::FrameSnapshot;
    use lumacast_core::mask::FaceAnchor;

    #[test]
    fn test_layout_matches_shader_block() {
        assert_eq!(UNIFORM_SIZE, 17 * 16);
    }

    #[test]
    fn test_identity_snapshot_packs_identity_transform() {
        let p = StageParams::new(&FrameSnapshot::default(), 64, 32, false, None, 7);
        let u = CompositeUniforms::new(&p, 0, None);
        assert_eq!(u.uv_row0[..3], [1.0, 0.0, 0.0]);
        assert_eq!(u.uv_row1[..3], [0.0, 1.0, 0.0]);
        assert_eq!(u.flags, [0, 0, 0, 7]);
        assert_eq!(u.optics[3], 2.0);
        assert_eq!(u.beauty_b[3], 0.0);
        assert_eq!(u.scope[2], 0);
    }

    #[test]
    fn test_anchor_only_packed_when_beauty_active() {
        let anchor = FaceAnchor {
            center: Vec2::splat(0.5),
            width: 0.4,
            lips: Vec2::new(0.5, 0.7),
            nose: Vec2::new(0.5, 0.55),
        };
        let mut snapshot = FrameSnapshot::default();
        let p = StageParams::new(&snapshot, 8, 8, false, Some(anchor), 0);
        assert_eq!(CompositeUniforms::new(&p, 0, None).beauty_b[3], 0.0);

        snapshot.beauty.enabled = true;
        snapshot.beauty.face_thin = 0.5;
        let p = StageParams::new(&snapshot, 8, 8, false, Some(anchor), 0);
        let u = CompositeUniforms::new(&p, 0, None);
        assert_eq!(u.beauty_b[3], 1.0);
        assert_eq!(u.anchor[..3], [0.5, 0.5, 0.4]);
        assert_eq!(u.features, [0.5, 0.7, 0.5, 0.55]);
    }
}
