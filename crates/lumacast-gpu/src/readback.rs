//! Double-buffered asynchronous readback of the composite output.
//!
//! Two staging slots alternate: while the GPU copies into one, the CPU
//! drains the other. The render thread only blocks when both slots are
//! still in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use image::RgbaImage;

use crate::textures::OutputTexture;

const MAP_PENDING: u8 = 0;
const MAP_OK: u8 = 1;
const MAP_FAILED: u8 = 2;

struct ReadbackSlot {
    staging: wgpu::Buffer,
    /// Written by the `map_async` callback.
    map_state: Arc<AtomicU8>,
    /// A copy was recorded and its map has not been consumed yet.
    in_flight: bool,
    /// Submission order, used to hand out the newest frame first.
    serial: u64,
    /// Video frame the recorded copy was composited from.
    source_sequence: u64,
}

impl ReadbackSlot {
    fn new(device: &wgpu::Device, size: u64, slot_label: &str) -> Self {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("lumacast_output_staging_{slot_label}")),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            staging,
            map_state: Arc::new(AtomicU8::new(MAP_PENDING)),
            in_flight: false,
            serial: 0,
            source_sequence: 0,
        }
    }

    fn is_ready(&self) -> bool {
        self.in_flight && self.map_state.load(Ordering::Acquire) != MAP_PENDING
    }

    fn begin_map(&self) {
        self.map_state.store(MAP_PENDING, Ordering::Release);
        let state = Arc::clone(&self.map_state);
        self.staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let next = match result {
                    Ok(()) => MAP_OK,
                    Err(e) => {
                        tracing::warn!(error = %e, "output readback map failed");
                        MAP_FAILED
                    }
                };
                state.store(next, Ordering::Release);
            });
    }

    /// Copy the mapped rows out, dropping row padding, and unmap.
    fn consume(&mut self, layout: &RowLayout) -> Option<FinishedFrame> {
        self.in_flight = false;
        if self.map_state.load(Ordering::Acquire) != MAP_OK {
            return None;
        }
        let bytes = {
            let data = self.staging.slice(..).get_mapped_range();
            let mut bytes = Vec::with_capacity((layout.unpadded * layout.height) as usize);
            for row in data.chunks_exact(layout.padded as usize).take(layout.height as usize) {
                bytes.extend_from_slice(&row[..layout.unpadded as usize]);
            }
            bytes
        };
        self.staging.unmap();
        let image = RgbaImage::from_raw(layout.width, layout.height, bytes)?;
        Some(FinishedFrame {
            image,
            source_sequence: self.source_sequence,
        })
    }
}

/// A read-back composite tagged with its source video frame.
pub struct FinishedFrame {
    pub image: RgbaImage,
    pub source_sequence: u64,
}

#[derive(Debug, Clone, Copy)]
struct RowLayout {
    width: u32,
    height: u32,
    unpadded: u32,
    padded: u32,
}

impl RowLayout {
    fn new(width: u32, height: u32) -> Self {
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        Self {
            width,
            height,
            unpadded,
            padded: unpadded.div_ceil(align) * align,
        }
    }
}

/// Pipelined readback for one output size.
pub struct FrameReadback {
    slots: [ReadbackSlot; 2],
    layout: RowLayout,
    next_serial: u64,
}

impl FrameReadback {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let layout = RowLayout::new(width, height);
        let size = layout.padded as u64 * height as u64;
        Self {
            slots: [
                ReadbackSlot::new(device, size, "a"),
                ReadbackSlot::new(device, size, "b"),
            ],
            layout,
            next_serial: 0,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.layout.width == width && self.layout.height == height
    }

    /// Non-blocking: process callbacks and take the newest finished frame.
    ///
    /// Older finished frames are discarded.
    pub fn try_consume(&mut self, device: &wgpu::Device) -> Option<FinishedFrame> {
        let _ = device.poll(wgpu::PollType::Poll);
        self.take_newest()
    }

    /// Block until every in-flight copy has landed, then take the newest.
    pub fn finish(&mut self, device: &wgpu::Device) -> Option<FinishedFrame> {
        if self.slots.iter().any(|s| s.in_flight) {
            let _ = device.poll(wgpu::PollType::wait_indefinitely());
        }
        self.take_newest()
    }

    /// Pick the slot the next copy goes into, waiting if both are busy.
    ///
    /// A frame drained while waiting is returned alongside the slot index.
    pub fn acquire_slot(&mut self, device: &wgpu::Device) -> (usize, Option<FinishedFrame>) {
        if let Some(idx) = self.idle_slot() {
            return (idx, None);
        }
        let drained = self.finish(device);
        let idx = self.idle_slot().unwrap_or(0);
        if self.slots[idx].in_flight {
            // Map never completed; unmapping resets the slot.
            self.slots[idx].staging.unmap();
            self.slots[idx].in_flight = false;
        }
        (idx, drained)
    }

    /// Record the output → staging copy for `slot`.
    pub fn record_copy(&self, encoder: &mut wgpu::CommandEncoder, output: &OutputTexture, slot: usize) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &output.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.slots[slot].staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.layout.padded),
                    rows_per_image: Some(self.layout.height),
                },
            },
            wgpu::Extent3d {
                width: self.layout.width,
                height: self.layout.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Start mapping `slot`, composited from video frame `source_sequence`.
    /// Call after `queue.submit()`.
    pub fn begin_map_after_submit(&mut self, slot: usize, source_sequence: u64) {
        self.next_serial += 1;
        let s = &mut self.slots[slot];
        s.serial = self.next_serial;
        s.source_sequence = source_sequence;
        s.in_flight = true;
        s.begin_map();
    }

    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|s| s.in_flight)
    }

    fn idle_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.in_flight)
    }

    fn take_newest(&mut self) -> Option<FinishedFrame> {
        let newest = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_ready())
            .max_by_key(|(_, s)| s.serial)
            .map(|(i, _)| i)?;
        let layout = self.layout;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i != newest && slot.is_ready() {
                slot.consume(&layout);
            }
        }
        self.slots[newest].consume(&layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_padded_to_copy_alignment() {
        let layout = RowLayout::new(65, 2);
        assert_eq!(layout.unpadded, 260);
        assert_eq!(layout.padded % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
        assert!(layout.padded >= layout.unpadded);

        let exact = RowLayout::new(64, 2);
        assert_eq!(exact.padded, exact.unpadded);
    }
}
