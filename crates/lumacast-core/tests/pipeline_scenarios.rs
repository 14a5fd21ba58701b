//! End-to-end scenarios over the CPU pipeline: LUT files, masks, overlays.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};

use lumacast_core::lut::{LutStore, generate_teal_orange, store::BUILTIN_IDENTITY};
use lumacast_core::mask::{FaceLandmarks, MaskConfig, MaskGenerator, regions};
use lumacast_core::render::{RenderInputs, composite};
use lumacast_core::scopes;
use lumacast_core::{BeautyConfig, FrameSnapshot, RenderMode, VideoFrame};

fn skin_frame(width: u32, height: u32) -> VideoFrame {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        let shade = ((x + 2 * y) % 17) as u8 * 3;
        Rgba([180 + shade / 2, 130 + shade, 110, 255])
    });
    VideoFrame::new(image, 1)
}

fn render(frame: &VideoFrame, snapshot: &FrameSnapshot, lut: Option<&Arc<lumacast_core::LutData>>, masks: Option<&Arc<lumacast_core::MaskPair>>) -> RgbaImage {
    composite(&RenderInputs {
        frame,
        snapshot,
        lut,
        masks,
        scopes: None,
        frame_index: 0,
    })
}

fn face(center: Vec2, radius: f32) -> FaceLandmarks {
    let mut points = vec![Vec3::new(center.x, center.y, 0.0); regions::LANDMARK_COUNT];
    let mut ring = |indices: &[usize], c: Vec2, r: f32| {
        for (n, idx) in indices.iter().enumerate() {
            let a = n as f32 / indices.len() as f32 * std::f32::consts::TAU;
            points[*idx] = Vec3::new(c.x + r * a.cos(), c.y + r * a.sin(), 0.0);
        }
    };
    ring(regions::FACE_OVAL, center, radius);
    ring(regions::LEFT_EYE, center + Vec2::new(0.35, -0.3) * radius, 0.15 * radius);
    ring(regions::RIGHT_EYE, center + Vec2::new(-0.35, -0.3) * radius, 0.15 * radius);
    ring(regions::LEFT_CHEEK, center + Vec2::new(0.5, 0.2) * radius, 0.15 * radius);
    ring(regions::RIGHT_CHEEK, center + Vec2::new(-0.5, 0.2) * radius, 0.15 * radius);
    ring(regions::NOSE, center + Vec2::new(0.0, 0.05) * radius, 0.1 * radius);
    ring(regions::LIPS, center + Vec2::new(0.0, 0.55) * radius, 0.18 * radius);
    FaceLandmarks::new(points)
}

#[test]
fn test_cube_file_loaded_from_disk_grades_frame() {
    let dir = std::env::temp_dir().join(format!("lumacast-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("teal_orange.cube");
    std::fs::write(&path, generate_teal_orange(17).to_cube()).unwrap();

    let store = LutStore::with_files();
    let source = format!("file://{}", path.display());
    let lut = store.activate(&source).unwrap();
    assert_eq!(lut.size, 17);
    assert!(store.is_pinned(&source));

    let frame = skin_frame(24, 24);
    let graded = render(&frame, &FrameSnapshot::default(), store.active().as_ref(), None);
    let before = frame.image.get_pixel(5, 5).0;
    let after = graded.get_pixel(5, 5).0;
    assert!(after[0] >= before[0], "warm highlights keep or raise red");

    let mut half = FrameSnapshot::default();
    half.grade.lut_strength = 0.0;
    let untouched = render(&frame, &half, store.active().as_ref(), None);
    assert_eq!(untouched.get_pixel(5, 5).0, before);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_switching_lut_keeps_previous_until_success() {
    let store = LutStore::with_files();
    store.activate(BUILTIN_IDENTITY).unwrap();
    assert!(store.activate("/definitely/not/here.cube").is_err());
    assert_eq!(store.active_key().as_deref(), Some(BUILTIN_IDENTITY));
}

#[test]
fn test_beauty_only_changes_face_region() {
    let (w, h) = (96, 96);
    let frame = skin_frame(w, h);
    let mut generator = MaskGenerator::new(MaskConfig::default()).unwrap();
    let masks = Arc::new(generator.update(Some(&face(Vec2::splat(0.5), 0.3)), w, h, 1));
    assert!(!masks.is_empty());

    let mut snapshot = FrameSnapshot::default();
    snapshot.beauty = BeautyConfig {
        enabled: true,
        eye_brighten: 1.0,
        skin_tone: 1.0,
        ..Default::default()
    };
    let plain = render(&frame, &FrameSnapshot::default(), None, None);
    let beautified = render(&frame, &snapshot, None, Some(&masks));

    // Corner is far outside the face and the blur radius.
    assert_eq!(plain.get_pixel(1, 1), beautified.get_pixel(1, 1));
    // Forehead skin warms.
    let (x, y) = (w / 2, (h as f32 * 0.32) as u32);
    assert!(beautified.get_pixel(x, y).0[0] > plain.get_pixel(x, y).0[0]);
}

#[test]
fn test_beauty_without_masks_is_a_no_op() {
    let frame = skin_frame(32, 32);
    let mut snapshot = FrameSnapshot::default();
    snapshot.beauty = BeautyConfig { enabled: true, smooth: 1.0, face_thin: 1.0, ..Default::default() };
    let plain = render(&frame, &FrameSnapshot::default(), None, None);
    assert_eq!(render(&frame, &snapshot, None, None), plain);
}

#[test]
fn test_histogram_overlay_draws_panel_from_previous_frame() {
    let frame = VideoFrame::new(RgbaImage::from_pixel(100, 100, Rgba([128, 128, 128, 255])), 1);
    let previous = scopes::compute(&frame.image);
    let snapshot = FrameSnapshot { render_mode: RenderMode::Histogram, ..Default::default() };
    let out = composite(&RenderInputs {
        frame: &frame,
        snapshot: &snapshot,
        lut: None,
        masks: None,
        scopes: Some(&previous),
        frame_index: 1,
    });
    // Outside the panel nothing changes.
    assert_eq!(out.get_pixel(50, 10).0, [128, 128, 128, 255]);
    // Inside the panel the background is dimmed except the filled bin.
    let dimmed = out.get_pixel(5, 80).0[0];
    assert!(dimmed < 60, "panel background {dimmed}");
}
