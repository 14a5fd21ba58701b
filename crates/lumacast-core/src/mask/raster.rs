//! Region rasterization into the two channel-packed mask surfaces.

use glam::Vec2;
use image::{Rgba, RgbaImage};
use tiny_skia::{
    BlendMode, FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform,
};

use super::regions::{MaskRegion, RegionShape, slot_of};

/// Jaw stroke width relative to the face width.
const JAW_STROKE_RATIO: f32 = 0.06;
const MIN_STROKE_PX: f32 = 2.0;

/// Output of one rasterization pass.
pub(crate) struct Rasterized {
    pub surfaces: [RgbaImage; 2],
    pub draw_calls: u32,
}

/// Draw every region from pixel-space `points` and pack coverage into
/// `[primary, secondary]` by the channel map. Returns `None` when the
/// pixmaps cannot be allocated (zero dimensions).
pub(crate) fn rasterize(points: &[Vec2], width: u32, height: u32) -> Option<Rasterized> {
    let mut surfaces = [empty_surface(width, height), empty_surface(width, height)];
    let mut draw_calls = 0;
    let face_width = face_width(points);

    let mut eyes_cutout = Vec::new();
    for contour in MaskRegion::Eyes.contours() {
        if let Some(path) = polygon(points, contour) {
            eyes_cutout.push(path);
        }
    }

    for region in MaskRegion::ALL {
        let mut layer = Pixmap::new(width, height)?;
        let paint = white_paint(BlendMode::SourceOver);

        for contour in region.contours() {
            match region.shape() {
                RegionShape::Fill => {
                    if let Some(path) = polygon(points, contour) {
                        layer.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
                        draw_calls += 1;
                    }
                }
                RegionShape::Stroke => {
                    if let Some(path) = polyline(points, contour) {
                        let stroke = Stroke {
                            width: (face_width * JAW_STROKE_RATIO).max(MIN_STROKE_PX),
                            line_cap: LineCap::Round,
                            line_join: LineJoin::Round,
                            ..Default::default()
                        };
                        layer.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                        draw_calls += 1;
                    }
                }
            }
        }

        if region == MaskRegion::Skin {
            // Eyes are never smoothed.
            let cut = white_paint(BlendMode::DestinationOut);
            for path in &eyes_cutout {
                layer.fill_path(path, &cut, FillRule::Winding, Transform::identity(), None);
                draw_calls += 1;
            }
        }

        let (surface, channel) = slot_of(region);
        pack_channel(&layer, &mut surfaces[surface.index()], channel.index());
    }

    Some(Rasterized { surfaces, draw_calls })
}

/// An opaque black surface: every region channel at zero coverage.
pub(crate) fn empty_surface(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
}

fn white_paint(blend_mode: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = true;
    paint.blend_mode = blend_mode;
    paint
}

/// Copy layer coverage (alpha) into one channel of `surface`.
fn pack_channel(layer: &Pixmap, surface: &mut RgbaImage, channel: usize) {
    for (dst, src) in surface.pixels_mut().zip(layer.pixels()) {
        dst.0[channel] = dst.0[channel].saturating_add(src.alpha());
    }
}

fn polygon(points: &[Vec2], indices: &[usize]) -> Option<Path> {
    let mut pb = trace(points, indices)?;
    pb.close();
    pb.finish()
}

fn polyline(points: &[Vec2], indices: &[usize]) -> Option<Path> {
    trace(points, indices)?.finish()
}

fn trace(points: &[Vec2], indices: &[usize]) -> Option<PathBuilder> {
    let (first, rest) = indices.split_first()?;
    let start = points.get(*first)?;
    let mut pb = PathBuilder::new();
    pb.move_to(start.x, start.y);
    for idx in rest {
        let p = points.get(*idx)?;
        pb.line_to(p.x, p.y);
    }
    Some(pb)
}

fn face_width(points: &[Vec2]) -> f32 {
    let (min, max) = super::regions::FACE_OVAL
        .iter()
        .filter_map(|i| points.get(*i))
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)));
    if max > min { max - min } else { 0.0 }
}
