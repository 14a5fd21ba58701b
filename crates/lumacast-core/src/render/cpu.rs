//! CPU reference composite and the software backend built on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Vec2;
use image::{Rgba, RgbaImage};

use super::backend::{RenderBackend, RenderInputs, RenderedFrame};
use super::stages::{
    self, LumaNeighbourhood, MaskSample, OverlayContext, StageParams, beauty_color, beauty_warp,
    detail_optics, geometric, in_bounds, lut_blend, overlay, pixel_uv, tonal,
};
use crate::color::luma;
use crate::error::BackendError;
use crate::mask::MaskPair;

/// Bilinear, clamp-to-edge sampling of an 8-bit image in UV space.
#[derive(Clone, Copy)]
pub struct Sampler<'a> {
    image: &'a RgbaImage,
}

impl<'a> Sampler<'a> {
    pub fn new(image: &'a RgbaImage) -> Self {
        Self { image }
    }

    pub fn sample(&self, uv: Vec2) -> [f32; 3] {
        let (w, h) = self.image.dimensions();
        if w == 0 || h == 0 {
            return [0.0; 3];
        }
        let x = uv.x * w as f32 - 0.5;
        let y = uv.y * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let fetch = |xi: f32, yi: f32| {
            let xi = (xi as i64).clamp(0, w as i64 - 1) as u32;
            let yi = (yi as i64).clamp(0, h as i64 - 1) as u32;
            let p = self.image.get_pixel(xi, yi).0;
            [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0]
        };
        let a = fetch(x0, y0);
        let b = fetch(x0 + 1.0, y0);
        let c = fetch(x0, y0 + 1.0);
        let d = fetch(x0 + 1.0, y0 + 1.0);

        let mut out = [0.0; 3];
        for i in 0..3 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }
}

struct SourceNeighbourhood<'a> {
    sampler: Sampler<'a>,
    uv: Vec2,
    texel: Vec2,
}

impl LumaNeighbourhood for SourceNeighbourhood<'_> {
    fn luma_at(&self, dx: i32, dy: i32) -> f32 {
        let offset = Vec2::new(dx as f32, dy as f32) * self.texel;
        luma(self.sampler.sample(self.uv + offset))
    }
}

/// Run the full stage chain on the CPU.
///
/// Output has the video frame's dimensions. With `bypass` set only the
/// geometric stage runs.
pub fn composite(inputs: &RenderInputs<'_>) -> RgbaImage {
    let source = inputs.frame.image.as_ref();
    let (width, height) = source.dimensions();
    let masks = inputs.masks.filter(|m| !m.is_empty()).map(Arc::as_ref);
    let anchor = masks.and_then(|m| m.anchor);
    let p = StageParams::new(
        inputs.snapshot,
        width,
        height,
        inputs.lut.is_some(),
        anchor,
        inputs.frame_index,
    );

    let sampler = Sampler::new(source);
    let texel = p.texel();
    let needs_detail = p.grade.sharpness != 0.0
        || p.grade.denoise != 0.0
        || (p.anchor.is_some() && p.beauty.smooth != 0.0);

    let mut out = RgbaImage::new(width, height);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let uv = pixel_uv(x, y, width, height);
        let mut src_uv = geometric(uv, &p);

        if p.bypass {
            let rgb = if in_bounds(src_uv) { sampler.sample(src_uv) } else { [0.0; 3] };
            *px = to_rgba8(rgb);
            continue;
        }

        if let Some(anchor) = &p.anchor {
            src_uv = beauty_warp(src_uv, anchor, &p.beauty);
        }
        if !in_bounds(src_uv) {
            *px = to_rgba8(overlay(
                [0.0; 3],
                &OverlayContext {
                    x,
                    y,
                    neighbourhood: &SourceNeighbourhood { sampler, uv: src_uv, texel },
                    scopes: inputs.scopes,
                },
                &p,
            ));
            continue;
        }

        let source_rgb = sampler.sample(src_uv);
        let detail = if needs_detail {
            high_pass(&sampler, src_uv, texel, source_rgb)
        } else {
            [0.0; 3]
        };

        let mut rgb = tonal(source_rgb, &p);
        if let Some(lut) = inputs.lut {
            rgb = lut_blend(rgb, lut.sample(rgb), p.grade.lut_strength);
        }
        rgb = detail_optics(rgb, detail, uv, x, y, &p);
        if let (Some(_), Some(m)) = (&p.anchor, masks) {
            rgb = beauty_color(rgb, detail, sample_masks(m, src_uv), &p.beauty);
        }
        rgb = stages::clamp01(rgb);

        let ctx = OverlayContext {
            x,
            y,
            neighbourhood: &SourceNeighbourhood { sampler, uv: src_uv, texel },
            scopes: inputs.scopes,
        };
        *px = to_rgba8(overlay(rgb, &ctx, &p));
    }
    out
}

fn high_pass(sampler: &Sampler<'_>, uv: Vec2, texel: Vec2, center: [f32; 3]) -> [f32; 3] {
    let n = [
        sampler.sample(uv + Vec2::new(texel.x, 0.0)),
        sampler.sample(uv - Vec2::new(texel.x, 0.0)),
        sampler.sample(uv + Vec2::new(0.0, texel.y)),
        sampler.sample(uv - Vec2::new(0.0, texel.y)),
    ];
    let mut out = [0.0; 3];
    for c in 0..3 {
        out[c] = center[c] - (n[0][c] + n[1][c] + n[2][c] + n[3][c]) * 0.25;
    }
    out
}

fn sample_masks(masks: &MaskPair, uv: Vec2) -> MaskSample {
    MaskSample {
        primary: Sampler::new(&masks.primary).sample(uv),
        secondary: Sampler::new(&masks.secondary).sample(uv),
    }
}

fn to_rgba8(rgb: [f32; 3]) -> Rgba<u8> {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([q(rgb[0]), q(rgb[1]), q(rgb[2]), 255])
}

/// Software backend running [`composite`] on the render thread.
///
/// Used when no graphics adapter is available and as the reference the
/// GPU output is checked against.
#[derive(Debug, Default)]
pub struct CpuBackend {
    acquired: bool,
    lost: Arc<AtomicBool>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that simulates a lost context, for exercising recovery.
    pub fn loss_trigger(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn acquire(&mut self) -> Result<(), BackendError> {
        self.lost.store(false, Ordering::Release);
        self.acquired = true;
        Ok(())
    }

    fn release(&mut self) {
        self.acquired = false;
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        if !self.acquired {
            return Err(BackendError::NotAcquired);
        }
        Ok(Some(RenderedFrame {
            image: Arc::new(composite(inputs)),
            source_sequence: inputs.frame.sequence,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::VideoFrame;
    use crate::lut::generate_identity;
    use crate::params::{FrameSnapshot, RenderMode};

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 7 % 256) as u8,
                255,
            ])
        })
    }

    fn render(frame: &VideoFrame, snapshot: &FrameSnapshot, lut: Option<&Arc<crate::lut::LutData>>) -> RgbaImage {
        composite(&RenderInputs {
            frame,
            snapshot,
            lut,
            masks: None,
            scopes: None,
            frame_index: 0,
        })
    }

    fn max_channel_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
        a.pixels()
            .zip(b.pixels())
            .flat_map(|(p, q)| (0..3).map(move |c| p.0[c].abs_diff(q.0[c])))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_bypass_with_identity_transform_copies_source() {
        let frame = VideoFrame::new(gradient(24, 16), 1);
        let snapshot = FrameSnapshot { bypass: true, ..Default::default() };
        let out = render(&frame, &snapshot, None);
        assert_eq!(max_channel_diff(&out, &frame.image), 0);
    }

    #[test]
    fn test_bypass_ignores_grade_but_keeps_geometry() {
        let frame = VideoFrame::new(gradient(24, 16), 1);
        let mut snapshot = FrameSnapshot { bypass: true, ..Default::default() };
        snapshot.grade.exposure = 2.0;
        snapshot.grade.saturation = 0.0;
        snapshot.render_mode = RenderMode::Heatmap;
        assert_eq!(max_channel_diff(&render(&frame, &snapshot, None), &frame.image), 0);

        snapshot.transform.flip_x = true;
        let flipped = render(&frame, &snapshot, None);
        assert_eq!(flipped.get_pixel(0, 3), frame.image.get_pixel(23, 3));
    }

    #[test]
    fn test_identity_grade_and_lut_match_bypass() {
        let frame = VideoFrame::new(gradient(32, 20), 1);
        let lut = Arc::new(generate_identity(33));
        let graded = render(&frame, &FrameSnapshot::default(), Some(&lut));
        let bypass = render(
            &frame,
            &FrameSnapshot { bypass: true, ..Default::default() },
            None,
        );
        assert!(max_channel_diff(&graded, &bypass) <= 1);
    }

    #[test]
    fn test_exposure_brightens() {
        let frame = VideoFrame::new(RgbaImage::from_pixel(8, 8, Rgba([60, 60, 60, 255])), 1);
        let mut snapshot = FrameSnapshot::default();
        snapshot.grade.exposure = 1.0;
        let out = render(&frame, &snapshot, None);
        assert_eq!(out.get_pixel(4, 4).0[0], 120);
    }

    #[test]
    fn test_zoom_out_exposes_black_border() {
        let frame = VideoFrame::new(RgbaImage::from_pixel(16, 16, Rgba([200, 200, 200, 255])), 1);
        let mut snapshot = FrameSnapshot::default();
        snapshot.transform.zoom = 0.5;
        let out = render(&frame, &snapshot, None);
        assert_eq!(out.get_pixel(0, 0).0[..3], [0, 0, 0]);
        assert_eq!(out.get_pixel(8, 8).0[..3], [200, 200, 200]);
    }

    #[test]
    fn test_backend_reports_context_loss() {
        let mut backend = CpuBackend::new();
        let frame = VideoFrame::new(gradient(4, 4), 1);
        let snapshot = FrameSnapshot::default();
        let inputs = RenderInputs {
            frame: &frame,
            snapshot: &snapshot,
            lut: None,
            masks: None,
            scopes: None,
            frame_index: 0,
        };
        assert_eq!(backend.render(&inputs), Err(BackendError::NotAcquired));
        backend.acquire().unwrap();
        let rendered = backend.render(&inputs).unwrap().unwrap();
        assert_eq!(rendered.source_sequence, 1);

        backend.loss_trigger().store(true, Ordering::Release);
        assert!(backend.is_context_lost());
        assert_eq!(backend.render(&inputs), Err(BackendError::ContextLost));
        backend.acquire().unwrap();
        assert!(!backend.is_context_lost());
    }
}
