//! Composite pipeline: stage math, the backend seam and the CPU backend.

pub mod backend;
pub mod cpu;
pub mod stages;

pub use backend::{RenderBackend, RenderInputs, RenderedFrame};
pub use cpu::{CpuBackend, composite};
pub use stages::StageParams;
