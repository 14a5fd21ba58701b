//! Lumacast Core — domain layer for the live compositing engine.
//!
//! Parameter snapshots, LUT generation/parsing/caching, facial-region masks,
//! the CPU reference composite, scopes, frame statistics, the health state
//! machine and the output surface. No GPU or runtime dependencies.

pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod health;
pub mod lut;
pub mod mask;
pub mod params;
pub mod render;
pub mod scopes;
pub mod stats;
pub mod surface;

// Re-exports for convenience.
pub use config::{AspectMode, BackendPreference, DistributorConfig, EngineConfig};
pub use error::{BackendError, ConfigError, LutError};
pub use frame::{FrameSlot, VideoFrame, VideoSource};
pub use health::{HealthConfig, HealthEvent, HealthMonitor, LivenessSignals};
pub use lut::{LutData, LutStore};
pub use mask::{FaceLandmarks, MaskGenerator, MaskPair};
pub use params::{
    BeautyConfig, FrameSnapshot, GradeParameters, RenderMode, SnapshotStore, TransformParameters,
};
pub use render::{CpuBackend, RenderBackend, RenderInputs, RenderedFrame};
pub use stats::{EngineStats, FrameClock, StatsCell};
pub use surface::{OutputSurface, SurfaceFrame, SurfaceReader};
