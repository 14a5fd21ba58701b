//! The seam between the compositor and whatever draws the frame.

use std::sync::Arc;

use image::RgbaImage;

use crate::error::BackendError;
use crate::frame::VideoFrame;
use crate::lut::LutData;
use crate::mask::MaskPair;
use crate::params::FrameSnapshot;
use crate::scopes::ScopeOverlay;

/// Everything bound for one composite.
pub struct RenderInputs<'a> {
    pub frame: &'a VideoFrame,
    pub snapshot: &'a FrameSnapshot,
    /// Active LUT; `None` skips the LUT stage.
    pub lut: Option<&'a Arc<LutData>>,
    /// Latest masks that are fresh enough to use.
    pub masks: Option<&'a Arc<MaskPair>>,
    /// Scopes from the previous output, for Histogram/RgbParade.
    pub scopes: Option<&'a ScopeOverlay>,
    pub frame_index: u32,
}

/// A finished composite and the video frame it was drawn from.
///
/// Pipelined backends hand out a frame submitted on an earlier call, so
/// the sequence travels with the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub image: Arc<RgbaImage>,
    pub source_sequence: u64,
}

/// A composite implementation (GPU compute or CPU reference).
///
/// The compositor owns its backend exclusively and calls `render` at most
/// once per tick.
pub trait RenderBackend: Send {
    fn name(&self) -> &'static str;

    /// Create device resources. Called on start and after context loss.
    fn acquire(&mut self) -> Result<(), BackendError>;

    /// Free device resources. Safe to call more than once.
    fn release(&mut self);

    /// True once the underlying context has been lost.
    fn is_context_lost(&self) -> bool;

    /// Composite one frame.
    ///
    /// Returns `Ok(None)` when the backend accepted the work but has no
    /// finished frame to hand out yet (pipelined readback).
    fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError>;
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn acquire(&mut self) -> Result<(), BackendError> {
        (**self).acquire()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_context_lost(&self) -> bool {
        (**self).is_context_lost()
    }

    fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
        (**self).render(inputs)
    }
}
