//! Off-screen render targets and the per-frame recording context.

use std::sync::mpsc;

use crate::error::{RenderError, RenderResult};
use crate::frame_constants::FrameConstantHandler;
use crate::gpu::GpuContext;

/// A GPU texture plus its default view, sized in pixels.
///
/// Every image the renderer owns (ping-pong color and depth, velocity, the
/// resolved transparency layer, the accumulation output) is one of these.
/// Targets are never resized in place; [`ensure_size`](Self::ensure_size)
/// replaces the texture outright.
///
/// # Fields
///
/// * `texture` - The underlying wgpu texture resource
/// * `view` - A view for attachments and shader bindings
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    label: &'static str,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    width: u32,
    height: u32,
}

impl RenderTarget {
    /// Creates a `width` x `height` single-sample 2D target.
    pub fn new(
        gpu: &GpuContext,
        label: &'static str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            label,
            format,
            usage,
            width,
            height,
        }
    }

    /// Recreates the target if its size differs. Contents are not preserved.
    pub fn ensure_size(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if self.width != width || self.height != height {
            *self = Self::new(gpu, self.label, width, height, self.format, self.usage);
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Copies an `Rgba8Unorm` target back to the host and blocks until done.
    ///
    /// The target needs `COPY_SRC`. Work already submitted to the queue is
    /// finished first, so this sees the last submitted frame.
    pub fn read_rgba8(&self, gpu: &GpuContext) -> RenderResult<image::RgbaImage> {
        if self.format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(RenderError::Readback(format!(
                "{} is {:?}, expected Rgba8Unorm",
                self.label, self.format
            )));
        }

        let row_bytes = self.width * 4;
        let padded_row = padded_bytes_per_row(row_bytes);
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            self.size(),
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * self.height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();

        log::debug!("read back {} ({}x{})", self.label, self.width, self.height);
        image::RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| RenderError::Readback(format!("{} returned a short buffer", self.label)))
    }
}

/// Rounds a row up to the alignment buffer copies require.
fn padded_bytes_per_row(row_bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    row_bytes.div_ceil(align) * align
}

/// Everything a pass needs while recording one frame.
///
/// The `'a` lifetime ties all references to the frame's scope, so passes
/// cannot hold on to the encoder or the constants past the frame.
pub struct RenderContext<'a> {
    pub gpu: &'a GpuContext,
    /// Passes append their commands here; the host submits.
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Already written for this frame; bind with [`FrameConstantHandler::binding`].
    pub constants: &'a FrameConstantHandler,
}

/// Workgroup counts covering `width` x `height` with `group`-sized tiles.
pub(crate) fn dispatch_size(width: u32, height: u32, group: (u32, u32)) -> (u32, u32) {
    (width.div_ceil(group.0), height.div_ceil(group.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_every_pixel() {
        assert_eq!(dispatch_size(1920, 1080, (8, 4)), (240, 270));
        assert_eq!(dispatch_size(1921, 1081, (8, 4)), (241, 271));
        assert_eq!(dispatch_size(1, 1, (8, 8)), (1, 1));
    }

    #[test]
    fn readback_rows_are_256_aligned() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(1028), 1280);
    }

    #[test]
    fn ensure_size_replaces_only_on_a_new_size() {
        let gpu = match GpuContext::headless() {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                return;
            }
        };
        let usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        let mut target = RenderTarget::new(&gpu, "Resize Target", 8, 4, wgpu::TextureFormat::Rgba8Unorm, usage);
        let original = target.texture.clone();

        target.ensure_size(&gpu, 8, 4);
        assert!(target.texture == original);

        target.ensure_size(&gpu, 16, 2);
        assert!(target.texture != original);
        assert_eq!((target.width(), target.height()), (16, 2));
        assert_eq!(target.texture.size(), target.size());
        assert_eq!(target.format(), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(target.texture.usage(), usage);
    }
}
