//! Lumacast GPU — wgpu compute backend for the live composite.
//!
//! Owns every device resource. The compositor talks to it only through
//! [`lumacast_core::RenderBackend`], so the CPU backend can stand in when
//! no adapter is available.

pub mod backend;
pub mod context;
pub mod pipeline;
pub mod readback;
pub mod textures;
pub mod uniforms;

pub use backend::GpuBackend;
pub use context::{GpuContext, is_available};
