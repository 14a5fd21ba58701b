//! wgpu implementation of [`RenderBackend`].

use std::sync::Arc;

use lumacast_core::render::{RenderBackend, RenderInputs, RenderedFrame, StageParams};
use lumacast_core::BackendError;

use crate::context::GpuContext;
use crate::pipeline::{CompositeBindings, CompositePipeline};
use crate::readback::{FinishedFrame, FrameReadback};
use crate::textures::{ImageTexture, LutTexture, MaskTextures, OutputTexture, ScopeBuffer};
use crate::uniforms::CompositeUniforms;

/// Resources sized to the current video frame.
struct FrameTargets {
    video: ImageTexture,
    output: OutputTexture,
    readback: FrameReadback,
}

impl FrameTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self {
            video: ImageTexture::new(device, width, height, "lumacast_video"),
            output: OutputTexture::new(device, width, height),
            readback: FrameReadback::new(device, width, height),
        }
    }
}

struct GpuResources {
    ctx: GpuContext,
    pipeline: CompositePipeline,
    lut: LutTexture,
    masks: MaskTextures,
    scopes: ScopeBuffer,
    targets: Option<FrameTargets>,
}

impl GpuResources {
    fn new(ctx: GpuContext) -> Self {
        let device = &ctx.device;
        let pipeline = CompositePipeline::new(device);
        let lut = LutTexture::placeholder(device);
        let masks = MaskTextures::placeholder(device, &ctx.queue);
        let scopes = ScopeBuffer::new(device);
        Self {
            ctx,
            pipeline,
            lut,
            masks,
            scopes,
            targets: None,
        }
    }
}

/// Compute-shader compositor.
///
/// Output is read back through two staging buffers, so the frame returned
/// by `render` is usually the one submitted on the previous call, tagged
/// with that call's video sequence. The first call returns `Ok(None)`.
#[derive(Default)]
pub struct GpuBackend {
    resources: Option<GpuResources>,
}

impl GpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter name once acquired.
    pub fn adapter_name(&self) -> Option<&str> {
        self.resources.as_ref().map(|r| r.ctx.adapter_info.name.as_str())
    }

    /// Mark the context lost as if the device had been removed.
    pub fn simulate_context_loss(&self) {
        if let Some(r) = &self.resources {
            r.ctx.mark_lost();
        }
    }

    /// Wait for in-flight work and return the newest composited frame.
    pub fn finish(&mut self) -> Result<Option<RenderedFrame>, BackendError> {
        let r = self.resources.as_mut().ok_or(BackendError::NotAcquired)?;
        if r.ctx.is_lost() {
            return Err(BackendError::ContextLost);
        }
        let Some(targets) = r.targets.as_mut() else {
            return Ok(None);
        };
        Ok(targets.readback.finish(&r.ctx.device).map(into_rendered))
    }
}

impl RenderBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn acquire(&mut self) -> Result<(), BackendError> {
        if self.resources.as_ref().is_some_and(|r| !r.ctx.is_lost()) {
            return Ok(());
        }
        self.resources = None;
        let ctx = GpuContext::new()?;
        self.resources = Some(GpuResources::new(ctx));
        Ok(())
    }

    fn release(&mut self) {
        if self.resources.take().is_some() {
            tracing::debug!("GPU resources released");
        }
    }

    fn is_context_lost(&self) -> bool {
        self.resources.as_ref().is_some_and(|r| r.ctx.is_lost())
    }

    fn render(&mut self, inputs: &RenderInputs<'_>) -> Result<Option<RenderedFrame>, BackendError> {
        let r = self.resources.as_mut().ok_or(BackendError::NotAcquired)?;
        if r.ctx.is_lost() {
            return Err(BackendError::ContextLost);
        }
        let device = &r.ctx.device;
        let queue = &r.ctx.queue;

        let (width, height) = inputs.frame.dimensions();
        if width == 0 || height == 0 {
            return Err(BackendError::Render("empty video frame".into()));
        }
        if !r.targets.as_ref().is_some_and(|t| t.video.matches(width, height)) {
            tracing::debug!(width, height, "allocating GPU frame targets");
            r.targets = Some(FrameTargets::new(device, width, height));
        }
        let Some(targets) = r.targets.as_mut() else {
            return Ok(None);
        };

        targets.video.upload(queue, &inputs.frame.image);

        let lut_size = match inputs.lut {
            Some(lut) => {
                r.lut.sync(device, queue, lut);
                lut.size
            }
            None => 0,
        };
        let masks = inputs.masks.filter(|m| !m.is_empty());
        if let Some(m) = masks {
            r.masks.sync(device, queue, m);
        }
        let scopes = inputs.scopes.filter(|_| inputs.snapshot.render_mode.needs_scopes());
        if let Some(s) = scopes {
            r.scopes.write(device, queue, s);
        }

        let params = StageParams::new(
            inputs.snapshot,
            width,
            height,
            lut_size > 0,
            masks.and_then(|m| m.anchor),
            inputs.frame_index,
        );
        let uniforms = CompositeUniforms::new(&params, lut_size, scopes);

        let finished = targets.readback.try_consume(device);
        let (slot, drained) = targets.readback.acquire_slot(device);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lumacast_composite_encoder"),
        });
        r.pipeline.dispatch(
            device,
            queue,
            &mut encoder,
            &uniforms,
            &CompositeBindings {
                video: &targets.video,
                lut: &r.lut,
                masks: &r.masks,
                scopes: &r.scopes,
                output: &targets.output,
            },
        );
        targets.readback.record_copy(&mut encoder, &targets.output, slot);
        queue.submit(std::iter::once(encoder.finish()));
        targets.readback.begin_map_after_submit(slot, inputs.frame.sequence);

        if r.ctx.is_lost() {
            return Err(BackendError::ContextLost);
        }
        Ok(finished.or(drained).map(into_rendered))
    }
}

fn into_rendered(frame: FinishedFrame) -> RenderedFrame {
    RenderedFrame {
        image: Arc::new(frame.image),
        source_sequence: frame.source_sequence,
    }
}
