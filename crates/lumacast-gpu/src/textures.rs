//! Device textures bound by the composite pass.
//!
//! Every resource is reallocated only when its dimensions change and
//! re-uploaded only when its source changes.

use std::sync::Arc;

use image::RgbaImage;
use wgpu::util::DeviceExt;

use lumacast_core::LutData;
use lumacast_core::mask::MaskPair;
use lumacast_core::scopes::{SCOPE_COLUMNS, SCOPE_LEVELS, ScopeOverlay};

/// Format shared by the video, mask and output textures.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// LUT voxels are uploaded as float RGBA.
pub const LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Sampled 8-bit RGBA texture (video frame or mask surface).
pub struct ImageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl ImageTexture {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn upload(&self, queue: &wgpu::Queue, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        queue.write_texture(
            full_copy(&self.texture),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            extent_2d(width, height),
        );
    }
}

/// Storage texture the shader writes and readback copies from.
pub struct OutputTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl OutputTexture {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumacast_output"),
            size: extent_2d(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// 3D LUT texture, red along x.
pub struct LutTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: u32,
    source: Option<Arc<LutData>>,
}

impl LutTexture {
    /// 2³ placeholder bound when no LUT is active.
    pub fn placeholder(device: &wgpu::Device) -> Self {
        Self::allocate(device, 2)
    }

    fn allocate(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("lumacast_lut"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: size,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: LUT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
            source: None,
        }
    }

    /// Make `lut` resident. No-op when it is already the uploaded table.
    pub fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, lut: &Arc<LutData>) {
        if self.source.as_ref().is_some_and(|s| Arc::ptr_eq(s, lut)) {
            return;
        }
        if self.size != lut.size {
            *self = Self::allocate(device, lut.size);
        }
        let rgba = pad_rgba(&lut.data);
        queue.write_texture(
            full_copy(&self.texture),
            bytemuck::cast_slice(&rgba),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(lut.size * 16),
                rows_per_image: Some(lut.size),
            },
            wgpu::Extent3d {
                width: lut.size,
                height: lut.size,
                depth_or_array_layers: lut.size,
            },
        );
        tracing::debug!(name = %lut.name, size = lut.size, "LUT uploaded");
        self.source = Some(Arc::clone(lut));
    }
}

/// Expand packed RGB voxels to RGBA with alpha 1.
pub fn pad_rgba(rgb: &[f32]) -> Vec<f32> {
    rgb.chunks_exact(3)
        .flat_map(|c| [c[0], c[1], c[2], 1.0])
        .collect()
}

/// Both mask surfaces, or 1×1 black placeholders.
pub struct MaskTextures {
    pub primary: ImageTexture,
    pub secondary: ImageTexture,
    source: Option<Arc<MaskPair>>,
}

impl MaskTextures {
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let primary = ImageTexture::new(device, 1, 1, "lumacast_mask_primary");
        let secondary = ImageTexture::new(device, 1, 1, "lumacast_mask_secondary");
        let black = RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
        primary.upload(queue, &black);
        secondary.upload(queue, &black);
        Self {
            primary,
            secondary,
            source: None,
        }
    }

    pub fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, masks: &Arc<MaskPair>) {
        if self.source.as_ref().is_some_and(|s| Arc::ptr_eq(s, masks)) {
            return;
        }
        let (w, h) = masks.dimensions();
        if !self.primary.matches(w, h) {
            self.primary = ImageTexture::new(device, w, h, "lumacast_mask_primary");
            self.secondary = ImageTexture::new(device, w, h, "lumacast_mask_secondary");
        }
        self.primary.upload(queue, &masks.primary);
        self.secondary.upload(queue, &masks.secondary);
        self.source = Some(Arc::clone(masks));
    }
}

/// Read-only storage buffer holding histogram then parade.
pub struct ScopeBuffer {
    pub buffer: wgpu::Buffer,
}

impl ScopeBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let zeros = ScopeOverlay::empty().to_buffer();
        debug_assert_eq!(zeros.len(), (SCOPE_LEVELS * (1 + 3 * SCOPE_COLUMNS)) as usize);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumacast_scopes"),
            contents: bytemuck::cast_slice(&zeros),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        Self { buffer }
    }

    /// Upload `scopes` if it fits; larger overlays reallocate.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scopes: &ScopeOverlay) {
        let data = scopes.to_buffer();
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        if bytes.len() as u64 > self.buffer.size() {
            self.buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lumacast_scopes"),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });
            return;
        }
        queue.write_buffer(&self.buffer, 0, bytes);
    }
}

fn extent_2d(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn full_copy(texture: &wgpu::Texture) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}
