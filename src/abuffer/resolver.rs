//! Sorts and blends each pixel's fragment chain into a premultiplied image.

use super::{ABuffer, storage_entry, uniform_entry};
use crate::error::RenderResult;
use crate::frame_pass::FramePass;
use crate::gpu::GpuContext;
use crate::render_target::{RenderContext, RenderTarget, dispatch_size};

const WORKGROUP: (u32, u32) = (8, 4);

/// Format of the resolved transparency layer.
pub const RESOLVED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Compute stage: one invocation per pixel.
///
/// Pixels without fragments resolve to `(0, 0, 0, 0)`, which leaves the
/// destination untouched under premultiplied blending.
pub struct ABufferResolver {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    output: RenderTarget,
}

impl ABufferResolver {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> RenderResult<Self> {
        let device = &gpu.device;

        let shader = gpu.create_shader(
            "ABuffer Resolve Shader",
            concat!(
                include_str!("../shaders/abuffer_common.wgsl"),
                include_str!("../shaders/abuffer_resolve.wgsl"),
            ),
        )?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ABuffer Resolve Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: RESOLVED_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ABuffer Resolve Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.checked("ABuffer Resolve Pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("ABuffer Resolve Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        Ok(Self {
            pipeline,
            layout,
            output: Self::create_output(gpu, width, height),
        })
    }

    fn create_output(gpu: &GpuContext, width: u32, height: u32) -> RenderTarget {
        RenderTarget::new(
            gpu,
            "Resolved Transparency",
            width,
            height,
            RESOLVED_FORMAT,
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        )
    }

    /// The image written by the last [`render`](FramePass::render).
    pub fn output(&self) -> &RenderTarget {
        &self.output
    }
}

impl FramePass for ABufferResolver {
    type Inputs<'a> = &'a ABuffer;

    fn on_resolution_changed(&mut self, gpu: &GpuContext, width: u32, height: u32) -> RenderResult<()> {
        self.output.ensure_size(gpu, width, height);
        log::info!("resolved transparency target {width}x{height}");
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>, abuffer: &ABuffer) {
        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ABuffer Resolve Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: abuffer.params_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: abuffer.head_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: abuffer.list_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.output.view),
                },
            ],
        });

        let mut pass = ctx.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("ABuffer Resolve Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let (x, y) = dispatch_size(self.output.width(), self.output.height(), WORKGROUP);
        pass.dispatch_workgroups(x, y, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::super::MAX_FRAGMENTS_PER_PIXEL;

    #[test]
    fn shader_bound_matches_host_bound() {
        let source = include_str!("../shaders/abuffer_resolve.wgsl");
        let declaration = format!("const MAX_FRAGMENTS: u32 = {MAX_FRAGMENTS_PER_PIXEL}u;");
        assert!(source.contains(&declaration));
    }

    #[test]
    fn shaders_share_the_sentinel() {
        let common = include_str!("../shaders/abuffer_common.wgsl");
        assert!(common.contains("const SENTINEL: u32 = 0xFFFFFFFFu;"));
        assert_eq!(super::super::SENTINEL, 0xFFFF_FFFF);
    }
}
