//! Live grading, transform and beauty parameters plus the snapshot store.
//!
//! The control layer mutates these on its own schedule. The compositor only
//! ever sees a [`FrameSnapshot`], copied out of [`SnapshotStore`] as one
//! value per tick, so no field can change underneath a frame.

use std::sync::Arc;

use glam::{Affine2, Vec2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Color grade applied by the tonal, LUT and detail stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeParameters {
    // Primary wheels [R, G, B, Master]
    /// Lift (shadows). Default: `[0, 0, 0, 0]`.
    pub lift: [f32; 4],
    /// Gamma (midtones). Default: `[1, 1, 1, 1]`.
    pub gamma: [f32; 4],
    /// Gain (highlights). Default: `[1, 1, 1, 1]`.
    pub gain: [f32; 4],

    /// Exposure in stops. 0.0 = neutral.
    pub exposure: f32,
    /// Color temperature shift. 0.0 = neutral.
    pub temperature: f32,
    /// Green-magenta tint. 0.0 = neutral.
    pub tint: f32,
    /// Saturation multiplier. 1.0 = neutral.
    pub saturation: f32,
    /// Contrast around mid grey. 1.0 = neutral.
    pub contrast: f32,

    /// Barrel (+) / pincushion (-) lens distortion.
    pub distortion: f32,
    pub sharpness: f32,
    /// Soft center key light, 0..1.
    pub portrait_light: f32,
    pub denoise: f32,
    pub grain: f32,
    pub vignette: f32,
    /// Blend between pre-LUT and LUT color, 0..1.
    pub lut_strength: f32,
}

impl Default for GradeParameters {
    /// Identity grade: the image passes through unchanged.
    fn default() -> Self {
        Self {
            lift: [0.0, 0.0, 0.0, 0.0],
            gamma: [1.0, 1.0, 1.0, 1.0],
            gain: [1.0, 1.0, 1.0, 1.0],
            exposure: 0.0,
            temperature: 0.0,
            tint: 0.0,
            saturation: 1.0,
            contrast: 1.0,
            distortion: 0.0,
            sharpness: 0.0,
            portrait_light: 0.0,
            denoise: 0.0,
            grain: 0.0,
            vignette: 0.0,
            lut_strength: 1.0,
        }
    }
}

/// Virtual-gimbal framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParameters {
    /// Zoom factor. 1.0 = full frame; values below 0.1 are clamped.
    pub zoom: f32,
    /// Rotation in degrees, clockwise.
    pub rotate: f32,
    /// Horizontal pan as a fraction of frame width.
    pub pan_x: f32,
    /// Vertical pan as a fraction of frame height.
    pub pan_y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    /// Counter-rotate by the device orientation angle.
    pub stabilize: bool,
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            rotate: 0.0,
            pan_x: 0.0,
            pan_y: 0.0,
            flip_x: false,
            flip_y: false,
            stabilize: false,
        }
    }
}

impl TransformParameters {
    /// Build the affine map from output UV to source UV.
    ///
    /// Rotation happens in aspect-corrected space so a square stays square.
    /// `orientation_deg` is only applied when `stabilize` is set.
    pub fn uv_transform(&self, aspect: f32, orientation_deg: f32) -> Affine2 {
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        let mut degrees = self.rotate;
        if self.stabilize {
            degrees -= orientation_deg;
        }
        let flip = Vec2::new(
            if self.flip_x { -1.0 } else { 1.0 },
            if self.flip_y { -1.0 } else { 1.0 },
        );
        let zoom = self.zoom.max(0.1);
        let center = Vec2::splat(0.5);

        Affine2::from_translation(center - Vec2::new(self.pan_x, self.pan_y))
            * Affine2::from_scale(flip / zoom)
            * Affine2::from_scale(Vec2::new(1.0 / aspect, 1.0))
            * Affine2::from_angle(-degrees.to_radians())
            * Affine2::from_scale(Vec2::new(aspect, 1.0))
            * Affine2::from_translation(-center)
    }
}

/// Annotation overlay selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    #[default]
    Standard,
    FocusPeaking,
    Zebras,
    Level,
    Heatmap,
    RgbParade,
    Histogram,
}

impl RenderMode {
    /// GPU-compatible integer for the shader uniform.
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Standard => 0,
            Self::FocusPeaking => 1,
            Self::Zebras => 2,
            Self::Level => 3,
            Self::Heatmap => 4,
            Self::RgbParade => 5,
            Self::Histogram => 6,
        }
    }

    /// Whether the overlay needs scope data from the previous frame.
    pub const fn needs_scopes(self) -> bool {
        matches!(self, Self::RgbParade | Self::Histogram)
    }
}

/// Mask-driven beauty effects, each strength in 0..1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeautyConfig {
    pub enabled: bool,
    pub smooth: f32,
    pub eye_brighten: f32,
    pub face_thin: f32,
    pub skin_tone: f32,
    pub cheekbones: f32,
    pub lips_fuller: f32,
    pub nose_slim: f32,
}

impl BeautyConfig {
    /// True when enabled and at least one strength would change the image.
    pub fn is_active(&self) -> bool {
        self.enabled
            && [
                self.smooth,
                self.eye_brighten,
                self.face_thin,
                self.skin_tone,
                self.cheekbones,
                self.lips_fuller,
                self.nose_slim,
            ]
            .iter()
            .any(|s| *s > 0.0)
    }
}

/// Everything the compositor reads for one tick, copied as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSnapshot {
    pub grade: GradeParameters,
    pub transform: TransformParameters,
    pub beauty: BeautyConfig,
    pub render_mode: RenderMode,
    /// Device orientation in degrees from the sensor abstraction.
    pub orientation_deg: f32,
    /// Run only the geometric stage ("original vs processed").
    pub bypass: bool,
}

/// Copy-on-write publication point for [`FrameSnapshot`].
///
/// Writers replace the whole `Arc` under a short write lock; readers clone
/// the `Arc` and keep a consistent value for the rest of the tick.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<FrameSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: FrameSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Publish a whole new snapshot.
    pub fn publish(&self, snapshot: FrameSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Apply an edit to a private copy, then publish it in one swap.
    pub fn update(&self, edit: impl FnOnce(&mut FrameSnapshot)) {
        let mut guard = self.current.write();
        let mut next = FrameSnapshot::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }

    pub fn set_grade(&self, grade: GradeParameters) {
        self.update(|s| s.grade = grade);
    }

    pub fn set_transform(&self, transform: TransformParameters) {
        self.update(|s| s.transform = transform);
    }

    pub fn set_beauty(&self, beauty: BeautyConfig) {
        self.update(|s| s.beauty = beauty);
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        self.update(|s| s.render_mode = mode);
    }

    pub fn set_orientation(&self, degrees: f32) {
        self.update(|s| s.orientation_deg = degrees);
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.update(|s| s.bypass = bypass);
    }
}
