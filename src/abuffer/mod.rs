//! Order-independent transparency through per-pixel fragment lists.
//!
//! Transparent geometry is not blended while it is rasterized. Instead every
//! covered pixel appends a [`FragmentEntry`] to one shared list buffer and
//! the fragments are sorted and blended afterwards, so the result does not
//! depend on draw order.
//!
//! # Frame flow
//!
//! 1. [`ABufferWriter`] clears the head map to [`SENTINEL`], resets the
//!    allocator counter, then draws every blended draw call. Each fragment
//!    claims a slot with an atomic add and prepends itself to its pixel's
//!    chain with an atomic exchange.
//! 2. [`ABufferResolver`] walks each pixel's chain, sorts back to front and
//!    blends into a premultiplied image.
//! 3. [`OverlayCompositor`] layers that image over the opaque color target.
//!
//! # Capacity
//!
//! The list holds `list_multiplier * width * height` entries. Once it is
//! full, further fragments are dropped for the rest of the frame. Output
//! becomes incomplete but never corrupt. [`FragmentArena`] reproduces the
//! protocol on the host for tests.
//!
//! # Buffer layout
//!
//! | Buffer | Contents                                           |
//! |--------|----------------------------------------------------|
//! | heads  | `u32` per pixel, row-major                         |
//! | list   | `u32` counter, then `capacity` 12-byte entries     |

mod arena;
mod composite;
mod compositor;
mod layout;
mod resolver;
mod writer;

pub use arena::FragmentArena;
pub use composite::{
    MAX_FRAGMENTS_PER_PIXEL, blend_sorted, composite, insert_nearest, pack_color, sort_back_to_front, unpack_color,
};
pub use compositor::{OverlayCompositor, OverlayInputs};
pub use layout::{ABufferLayout, FRAGMENT_ENTRY_SIZE, FragmentEntry, LIST_HEADER_SIZE, SENTINEL};
pub use resolver::ABufferResolver;
pub use writer::{ABufferWriter, InstanceData, WriterInputs};

use crate::error::RenderResult;
use crate::gpu::GpuContext;

/// Sizes shared by the clear, write and resolve shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct ABufferParams {
    pub width: u32,
    pub height: u32,
    pub capacity: u32,
    pub pixel_count: u32,
}

impl From<&ABufferLayout> for ABufferParams {
    fn from(layout: &ABufferLayout) -> Self {
        Self {
            width: layout.width(),
            height: layout.height(),
            capacity: layout.capacity(),
            pixel_count: layout.pixel_count(),
        }
    }
}

/// GPU storage for the head map and the fragment list.
pub struct ABuffer {
    layout: ABufferLayout,
    params_buffer: wgpu::Buffer,
    head_buffer: wgpu::Buffer,
    list_buffer: wgpu::Buffer,
}

impl ABuffer {
    /// Allocates buffers for a `width` x `height` target.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](crate::ConfigError) if the size or
    /// multiplier is zero, the capacity overflows, or the list exceeds the
    /// device's storage binding limit.
    pub fn new(gpu: &GpuContext, width: u32, height: u32, multiplier: u32) -> RenderResult<Self> {
        let layout = ABufferLayout::new(width, height, multiplier)?;
        layout.check_binding_limit(gpu.max_storage_binding_size())?;

        let params_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ABuffer Params"),
            size: std::mem::size_of::<ABufferParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        gpu.queue
            .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&ABufferParams::from(&layout)));

        let head_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ABuffer Heads"),
            size: layout.head_buffer_size(),
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let list_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ABuffer Fragment List"),
            size: layout.list_buffer_size(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "allocated A-buffer {}x{}: {} fragment slots ({} KiB)",
            width,
            height,
            layout.capacity(),
            (layout.list_buffer_size() + layout.head_buffer_size()) / 1024
        );

        Ok(Self {
            layout,
            params_buffer,
            head_buffer,
            list_buffer,
        })
    }

    /// Reallocates both buffers for a new resolution, keeping the multiplier.
    pub fn on_resolution_changed(&mut self, gpu: &GpuContext, width: u32, height: u32) -> RenderResult<()> {
        *self = Self::new(gpu, width, height, self.layout.multiplier())?;
        Ok(())
    }

    pub fn layout(&self) -> &ABufferLayout {
        &self.layout
    }

    pub(crate) fn params_buffer(&self) -> &wgpu::Buffer {
        &self.params_buffer
    }

    pub(crate) fn head_buffer(&self) -> &wgpu::Buffer {
        &self.head_buffer
    }

    pub(crate) fn list_buffer(&self) -> &wgpu::Buffer {
        &self.list_buffer
    }
}

/// Layout entry for a storage buffer binding.
pub(crate) fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entry for a uniform buffer binding.
pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_mirror_layout() {
        let layout = ABufferLayout::new(16, 8, 3).unwrap();
        let params = ABufferParams::from(&layout);
        assert_eq!(
            params,
            ABufferParams {
                width: 16,
                height: 8,
                capacity: 384,
                pixel_count: 128
            }
        );
        assert_eq!(std::mem::size_of::<ABufferParams>(), 16);
    }
}
