//! Per-pixel composite stages. `composite.wgsl` mirrors these exactly.
//!
//! Evaluation order:
//! 1. Geometric transform (zoom/rotate/pan/flip, lens distortion)
//! 2. Beauty warp at the sampling coordinate
//! 3. Tonal stage (lift/gamma/gain, exposure, white balance, saturation, contrast)
//! 4. 3D LUT blended by `lut_strength`
//! 5. Detail/optics (sharpen, denoise, grain, vignette, portrait light)
//! 6. Beauty color (smoothing, eye brighten, skin tone, cheekbones)
//! 7. Render-mode overlay

use glam::{Affine2, Vec2};

use crate::color::{
    self, apply_contrast, apply_exposure, apply_lift_gamma_gain, apply_saturation, luma,
    mat3_mul, smoothstep,
};
use crate::mask::FaceAnchor;
use crate::params::{BeautyConfig, FrameSnapshot, GradeParameters, RenderMode};
use crate::scopes::ScopeOverlay;

/// Focus peaking Sobel threshold on luma.
pub const PEAKING_THRESHOLD: f32 = 0.2;
/// Zebra stripes above this luma.
pub const ZEBRA_THRESHOLD: f32 = 0.95;
/// Level line turns green within this many degrees of horizontal.
pub const LEVEL_TOLERANCE_DEG: f32 = 1.0;

pub const PEAKING_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
pub const LEVEL_OK_COLOR: [f32; 3] = [0.0, 1.0, 0.0];
pub const LEVEL_OFF_COLOR: [f32; 3] = [1.0, 0.75, 0.0];

/// Per-tick values derived once from the snapshot.
#[derive(Debug, Clone)]
pub struct StageParams {
    pub uv_transform: Affine2,
    pub white_balance: [[f32; 3]; 3],
    pub grade: GradeParameters,
    pub beauty: BeautyConfig,
    /// Present only when beauty is active and the masks are usable.
    pub anchor: Option<FaceAnchor>,
    pub mode: RenderMode,
    pub bypass: bool,
    pub orientation_deg: f32,
    pub has_lut: bool,
    pub frame_index: u32,
    pub width: u32,
    pub height: u32,
}

impl StageParams {
    pub fn new(
        snapshot: &FrameSnapshot,
        width: u32,
        height: u32,
        has_lut: bool,
        anchor: Option<FaceAnchor>,
        frame_index: u32,
    ) -> Self {
        let aspect = if height > 0 { width as f32 / height as f32 } else { 1.0 };
        let anchor = anchor.filter(|_| snapshot.beauty.is_active());
        Self {
            uv_transform: snapshot
                .transform
                .uv_transform(aspect, snapshot.orientation_deg),
            white_balance: color::white_balance_matrix(
                snapshot.grade.temperature,
                snapshot.grade.tint,
            ),
            grade: snapshot.grade.clone(),
            beauty: snapshot.beauty.clone(),
            anchor,
            mode: snapshot.render_mode,
            bypass: snapshot.bypass,
            orientation_deg: snapshot.orientation_deg,
            has_lut,
            frame_index,
            width,
            height,
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0 { self.width as f32 / self.height as f32 } else { 1.0 }
    }

    pub fn texel(&self) -> Vec2 {
        Vec2::new(1.0 / self.width.max(1) as f32, 1.0 / self.height.max(1) as f32)
    }
}

/// Output UV of the pixel center at `(x, y)`.
pub fn pixel_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new((x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32)
}

/// Affine framing followed by radial lens distortion.
///
/// ```text
/// c = uv − 0.5
/// src = 0.5 + c × (1 + distortion × |c|²)
/// ```
pub fn geometric(uv: Vec2, p: &StageParams) -> Vec2 {
    let src = p.uv_transform.transform_point2(uv);
    let k = p.grade.distortion;
    if k == 0.0 {
        return src;
    }
    let c = src - Vec2::splat(0.5);
    Vec2::splat(0.5) + c * (1.0 + k * c.length_squared())
}

pub fn in_bounds(uv: Vec2) -> bool {
    (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)
}

/// Slim/fuller warp evaluated at the sampling coordinate.
///
/// Face thinning and nose slimming sample from further out horizontally so
/// the content narrows; lip fullness samples closer to the lip center.
pub fn beauty_warp(uv: Vec2, anchor: &FaceAnchor, beauty: &BeautyConfig) -> Vec2 {
    let mut uv = uv;
    let radius = (anchor.width * 0.6).max(1e-4);

    let face = 1.0 - smoothstep(0.5, 1.0, ((uv - anchor.center) / radius).length());
    uv.x = anchor.center.x + (uv.x - anchor.center.x) * (1.0 + beauty.face_thin * 0.1 * face);

    let lips = 1.0 - smoothstep(0.0, 1.0, ((uv - anchor.lips) / (radius * 0.4)).length());
    uv = anchor.lips + (uv - anchor.lips) * (1.0 - beauty.lips_fuller * 0.15 * lips);

    let nose = 1.0 - smoothstep(0.0, 1.0, ((uv - anchor.nose) / (radius * 0.25)).length());
    uv.x = anchor.nose.x + (uv.x - anchor.nose.x) * (1.0 + beauty.nose_slim * 0.2 * nose);
    uv
}

/// Lift/gamma/gain, exposure, white balance, saturation, contrast; clamped.
pub fn tonal(rgb: [f32; 3], p: &StageParams) -> [f32; 3] {
    let g = &p.grade;
    let rgb = apply_lift_gamma_gain(rgb, g.lift, g.gamma, g.gain);
    let rgb = apply_exposure(rgb, g.exposure);
    let rgb = mat3_mul(&p.white_balance, rgb);
    let rgb = apply_saturation(rgb, g.saturation);
    clamp01(apply_contrast(rgb, g.contrast))
}

/// Mix pre-LUT and LUT color by `lut_strength`.
pub fn lut_blend(rgb: [f32; 3], lut_rgb: [f32; 3], strength: f32) -> [f32; 3] {
    let s = strength.clamp(0.0, 1.0);
    [
        rgb[0] + (lut_rgb[0] - rgb[0]) * s,
        rgb[1] + (lut_rgb[1] - rgb[1]) * s,
        rgb[2] + (lut_rgb[2] - rgb[2]) * s,
    ]
}

/// Sharpen, denoise, grain, vignette and portrait light.
///
/// `detail` is the source high-pass (center minus 4-neighbour mean).
pub fn detail_optics(rgb: [f32; 3], detail: [f32; 3], uv: Vec2, x: u32, y: u32, p: &StageParams) -> [f32; 3] {
    let g = &p.grade;
    let mut out = rgb;
    let k = g.sharpness * 1.5 - g.denoise;
    for c in 0..3 {
        out[c] += detail[c] * k;
    }

    if g.grain > 0.0 {
        let n = grain_noise(x, y, p.frame_index) * g.grain * 0.15;
        for v in &mut out {
            *v += n;
        }
    }

    let d = (uv - Vec2::splat(0.5)).length() * std::f32::consts::SQRT_2;
    let vignette = 1.0 - g.vignette * smoothstep(0.4, 1.0, d);
    let light = 1.0 + g.portrait_light * 0.3 * (1.0 - smoothstep(0.0, 0.7, d));
    for v in &mut out {
        *v *= vignette * light;
    }
    out
}

/// Hash of pixel position and frame index in `[-0.5, 0.5)`.
pub fn grain_noise(x: u32, y: u32, frame: u32) -> f32 {
    let mut h = x.wrapping_mul(0x8da6_b343) ^ y.wrapping_mul(0xd816_3841) ^ frame.wrapping_mul(0xcb1a_b31f);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    (h >> 8) as f32 / 16_777_216.0 - 0.5
}

/// Region coverage at the sampling coordinate, `[skin, eyes, jaw]` and
/// `[cheeks, lips, nose]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskSample {
    pub primary: [f32; 3],
    pub secondary: [f32; 3],
}

/// Mask-driven color adjustments.
pub fn beauty_color(rgb: [f32; 3], detail: [f32; 3], m: MaskSample, b: &BeautyConfig) -> [f32; 3] {
    let [skin, eyes, _jaw] = m.primary;
    let [cheeks, _lips, _nose] = m.secondary;
    let mut out = rgb;
    for c in 0..3 {
        out[c] -= detail[c] * b.smooth * skin;
        out[c] += eyes * b.eye_brighten * 0.12;
    }
    const WARM: [f32; 3] = [1.04, 1.0, 0.96];
    let tone = skin * b.skin_tone;
    let shade = 1.0 - cheeks * b.cheekbones * 0.08;
    for c in 0..3 {
        out[c] = (out[c] + (out[c] * WARM[c] - out[c]) * tone) * shade;
    }
    out
}

/// Neighbourhood needed by the overlays, sampled around the source UV.
pub trait LumaNeighbourhood {
    /// Source luma at `uv` offset by `(dx, dy)` texels.
    fn luma_at(&self, dx: i32, dy: i32) -> f32;
}

/// Sobel gradient magnitude of the source luma.
pub fn sobel(n: &impl LumaNeighbourhood) -> f32 {
    let l = |dx, dy| n.luma_at(dx, dy);
    let gx = -l(-1, -1) - 2.0 * l(-1, 0) - l(-1, 1) + l(1, -1) + 2.0 * l(1, 0) + l(1, 1);
    let gy = -l(-1, -1) - 2.0 * l(0, -1) - l(1, -1) + l(-1, 1) + 2.0 * l(0, 1) + l(1, 1);
    (gx * gx + gy * gy).sqrt()
}

/// Inputs to the render-mode overlay for one pixel.
pub struct OverlayContext<'a, N: LumaNeighbourhood> {
    pub x: u32,
    pub y: u32,
    pub neighbourhood: &'a N,
    pub scopes: Option<&'a ScopeOverlay>,
}

/// Apply the selected render-mode annotation. `Standard` returns `rgb`.
pub fn overlay<N: LumaNeighbourhood>(rgb: [f32; 3], ctx: &OverlayContext<'_, N>, p: &StageParams) -> [f32; 3] {
    match p.mode {
        RenderMode::Standard => rgb,
        RenderMode::FocusPeaking => {
            if sobel(ctx.neighbourhood) > PEAKING_THRESHOLD {
                PEAKING_COLOR
            } else {
                rgb
            }
        }
        RenderMode::Zebras => {
            if luma(rgb) > ZEBRA_THRESHOLD && ((ctx.x + ctx.y) / 6) % 2 == 0 {
                [0.0; 3]
            } else {
                rgb
            }
        }
        RenderMode::Level => level_line(rgb, ctx.x, ctx.y, p),
        RenderMode::Heatmap => color::heatmap(luma(rgb)),
        RenderMode::Histogram => {
            match panel_uv(ctx.x, ctx.y, p, HISTOGRAM_PANEL) {
                Some(local) => histogram_panel(rgb, local, ctx.scopes),
                None => rgb,
            }
        }
        RenderMode::RgbParade => {
            match panel_uv(ctx.x, ctx.y, p, PARADE_PANEL) {
                Some(local) => parade_panel(rgb, local, ctx.scopes),
                None => rgb,
            }
        }
    }
}

/// Horizon line through the frame center, tilted by the device orientation.
fn level_line(rgb: [f32; 3], x: u32, y: u32, p: &StageParams) -> [f32; 3] {
    let angle = (-p.orientation_deg).to_radians();
    let d = Vec2::new(x as f32 + 0.5 - p.width as f32 * 0.5, y as f32 + 0.5 - p.height as f32 * 0.5);
    let dist = (-angle.sin() * d.x + angle.cos() * d.y).abs();
    if dist > 1.5 {
        return rgb;
    }
    if p.orientation_deg.abs() < LEVEL_TOLERANCE_DEG {
        LEVEL_OK_COLOR
    } else {
        LEVEL_OFF_COLOR
    }
}

/// Panel rectangle in output UV: `(u0, v0, u1, v1)`.
pub const HISTOGRAM_PANEL: [f32; 4] = [0.02, 0.76, 0.32, 0.98];
pub const PARADE_PANEL: [f32; 4] = [0.62, 0.76, 0.98, 0.98];

const PANEL_DIM: f32 = 0.35;

fn panel_uv(x: u32, y: u32, p: &StageParams, rect: [f32; 4]) -> Option<Vec2> {
    let uv = pixel_uv(x, y, p.width, p.height);
    if uv.x < rect[0] || uv.x >= rect[2] || uv.y < rect[1] || uv.y >= rect[3] {
        return None;
    }
    Some(Vec2::new(
        (uv.x - rect[0]) / (rect[2] - rect[0]),
        (uv.y - rect[1]) / (rect[3] - rect[1]),
    ))
}

fn histogram_panel(rgb: [f32; 3], local: Vec2, scopes: Option<&ScopeOverlay>) -> [f32; 3] {
    let dim = [rgb[0] * PANEL_DIM, rgb[1] * PANEL_DIM, rgb[2] * PANEL_DIM];
    let Some(scopes) = scopes else { return dim };
    let bin = ((local.x * scopes.levels as f32) as u32).min(scopes.levels - 1);
    if 1.0 - local.y <= scopes.histogram_at(bin) {
        [0.85; 3]
    } else {
        dim
    }
}

fn parade_panel(rgb: [f32; 3], local: Vec2, scopes: Option<&ScopeOverlay>) -> [f32; 3] {
    let mut out = [rgb[0] * PANEL_DIM, rgb[1] * PANEL_DIM, rgb[2] * PANEL_DIM];
    let Some(scopes) = scopes else { return out };
    let third = local.x * 3.0;
    let ch = (third as usize).min(2);
    let column = ((third.fract() * scopes.columns as f32) as u32).min(scopes.columns - 1);
    let level = (((1.0 - local.y) * scopes.levels as f32) as u32).min(scopes.levels - 1);
    let density = (scopes.parade_at(ch, column, level) * 4.0).min(1.0);
    out[ch] += density;
    out
}

pub fn clamp01(rgb: [f32; 3]) -> [f32; 3] {
    [rgb[0].clamp(0.0, 1.0), rgb[1].clamp(0.0, 1.0), rgb[2].clamp(0.0, 1.0)]
}
