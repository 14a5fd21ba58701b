//! Facial-region mask generation.
//!
//! Each update turns one landmark set into two channel-packed RGBA surfaces
//! (see [`regions::CHANNEL_MAP`]) that the compositor samples by UV. The only
//! state carried between updates is the landmark smoothing history.

pub mod raster;
pub mod regions;
pub mod smoothing;

use glam::{Vec2, Vec3};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub use regions::{
    CHANNEL_MAP, Channel, ChannelMapError, MaskRegion, MaskSurfaceId, validate_channel_map,
};
pub use smoothing::LandmarkSmoother;

/// Mask generator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Landmark smoothing blend factor, clamped to `[0.1, 1.0]`.
    pub smoothing_factor: f32,
    /// Edge softening in pixels, clamped to `[8, 12]`.
    pub blur_px: f32,
    /// Masks wider than this are rendered at reduced resolution.
    pub max_width: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: smoothing::DEFAULT_SMOOTHING_FACTOR,
            blur_px: 10.0,
            max_width: 640,
        }
    }
}

/// One face from the landmark producer, normalized `x, y ∈ [0, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<Vec3>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points }
    }

    /// True when the set has the full face mesh.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= regions::LANDMARK_COUNT
    }
}

/// Face geometry used by the slim/fuller warp, in normalized UV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceAnchor {
    /// Mean of the face oval.
    pub center: Vec2,
    /// Oval width as a fraction of the frame width.
    pub width: f32,
    pub lips: Vec2,
    pub nose: Vec2,
}

/// The two mask surfaces produced by one update.
#[derive(Debug, Clone)]
pub struct MaskPair {
    /// Skin (R), eyes (G), jaw contour (B).
    pub primary: RgbaImage,
    /// Cheeks (R), lips (G), nose (B).
    pub secondary: RgbaImage,
    /// Increments on every update, cleared or not.
    pub generation: u64,
    /// Capture sequence of the video frame the landmarks came from.
    pub source_sequence: u64,
    /// `None` when the surfaces are cleared.
    pub anchor: Option<FaceAnchor>,
}

impl MaskPair {
    pub fn is_empty(&self) -> bool {
        self.anchor.is_none()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.primary.dimensions()
    }

    /// Coverage of `region` at a pixel, in `[0, 1]`.
    pub fn coverage(&self, region: MaskRegion, x: u32, y: u32) -> f32 {
        let (surface, channel) = regions::slot_of(region);
        let image = match surface {
            MaskSurfaceId::Primary => &self.primary,
            MaskSurfaceId::Secondary => &self.secondary,
        };
        image
            .get_pixel_checked(x, y)
            .map_or(0.0, |p| p.0[channel.index()] as f32 / 255.0)
    }
}

/// Converts landmark sets into [`MaskPair`]s with temporal smoothing.
pub struct MaskGenerator {
    config: MaskConfig,
    smoother: LandmarkSmoother,
    generation: u64,
    draw_calls: u32,
    scratch: Vec<Vec2>,
}

impl MaskGenerator {
    /// Build a generator, checking the region packing first.
    pub fn new(config: MaskConfig) -> Result<Self, ChannelMapError> {
        validate_channel_map(&CHANNEL_MAP)?;
        Ok(Self {
            smoother: LandmarkSmoother::new(config.smoothing_factor),
            config,
            generation: 0,
            draw_calls: 0,
            scratch: Vec::new(),
        })
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Drawing operations issued by the last update.
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    /// Drop the smoothing history.
    pub fn reset(&mut self) {
        self.smoother.reset();
    }

    /// Mask resolution for a video of `width × height`.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 || width <= self.config.max_width {
            return (width, height);
        }
        let scale = self.config.max_width as f32 / width as f32;
        let h = ((height as f32 * scale).round() as u32).max(1);
        (self.config.max_width, h)
    }

    /// Produce masks for one landmark set.
    ///
    /// Absent or incomplete landmarks and zero dimensions clear both
    /// surfaces without drawing; absent landmarks also reset smoothing.
    pub fn update(
        &mut self,
        landmarks: Option<&FaceLandmarks>,
        width: u32,
        height: u32,
        source_sequence: u64,
    ) -> MaskPair {
        self.generation += 1;
        self.draw_calls = 0;

        let face = match landmarks {
            Some(face) if face.is_complete() && width > 0 && height > 0 => face,
            _ => {
                if landmarks.is_none() {
                    self.smoother.reset();
                }
                return self.cleared(width, height, source_sequence);
            }
        };

        self.scratch.clear();
        let size = Vec2::new(width as f32, height as f32);
        self.scratch
            .extend(face.points.iter().map(|p| Vec2::new(p.x, p.y) * size));
        let points = self.smoother.smooth(&self.scratch, width, height);
        let anchor = anchor_of(points, size);

        let Some(raster) = raster::rasterize(points, width, height) else {
            tracing::warn!("mask rasterization failed at {width}x{height}");
            return self.cleared(width, height, source_sequence);
        };
        self.draw_calls = raster.draw_calls;

        let sigma = self.config.blur_px.clamp(8.0, 12.0);
        let [primary, secondary] = raster.surfaces;
        MaskPair {
            primary: image::imageops::blur(&primary, sigma),
            secondary: image::imageops::blur(&secondary, sigma),
            generation: self.generation,
            source_sequence,
            anchor,
        }
    }

    fn cleared(&self, width: u32, height: u32, source_sequence: u64) -> MaskPair {
        MaskPair {
            primary: raster::empty_surface(width, height),
            secondary: raster::empty_surface(width, height),
            generation: self.generation,
            source_sequence,
            anchor: None,
        }
    }
}

fn anchor_of(points: &[Vec2], size: Vec2) -> Option<FaceAnchor> {
    let oval: Vec<Vec2> = regions::FACE_OVAL
        .iter()
        .filter_map(|i| points.get(*i).copied())
        .collect();
    if oval.is_empty() {
        return None;
    }
    let (min_x, max_x) = oval
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), p| (lo.min(p.x), hi.max(p.x)));
    Some(FaceAnchor {
        center: mean(points, regions::FACE_OVAL)? / size,
        width: (max_x - min_x) / size.x,
        lips: mean(points, regions::LIPS)? / size,
        nose: mean(points, regions::NOSE)? / size,
    })
}

fn mean(points: &[Vec2], indices: &[usize]) -> Option<Vec2> {
    let mut sum = Vec2::ZERO;
    for i in indices {
        sum += *points.get(*i)?;
    }
    (!indices.is_empty()).then(|| sum / indices.len() as f32)
}
