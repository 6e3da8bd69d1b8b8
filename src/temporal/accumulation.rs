//! Temporal accumulation: blends the fresh frame with last frame's result.
//!
//! Reads current color and depth, velocity, and history color and depth,
//! writes the blend into [`TemporalTargets::accumulated`], then copies that
//! back into the current color slot. Subsequent passes and the next frame's
//! history therefore see the accumulated image, not the raw render.
//!
//! When history is invalidated the current images are bound in place of the
//! history ones and the shader writes the current color unchanged.

use glam::Vec4;

use super::targets::{COLOR_FORMAT, TemporalTargets};
use crate::abuffer::uniform_entry;
use crate::error::RenderResult;
use crate::frame_constants::FrameConstantHandler;
use crate::frame_pass::FramePass;
use crate::gpu::GpuContext;
use crate::render_target::{RenderContext, dispatch_size};

const WORKGROUP: (u32, u32) = (8, 8);

/// History is rejected where depth moved by more than this.
const DEPTH_TOLERANCE: f32 = 0.01;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct AccumulationParams {
    history_weight: f32,
    invalidated: u32,
    depth_tolerance: f32,
    _pad: u32,
}

/// Host model of the per-pixel blend, without reprojection.
///
/// History is clamped to the `[lo, hi]` neighborhood box of the current
/// frame and mixed in with `history_weight`. With `invalidated` set the
/// result is the current color.
pub fn blend_history(current: Vec4, history: Vec4, lo: Vec4, hi: Vec4, history_weight: f32, invalidated: bool) -> Vec4 {
    if invalidated {
        return current;
    }
    current.lerp(history.clamp(lo, hi), history_weight)
}

/// Resources the accumulation pass reads for one frame.
pub struct AccumulationInputs<'a> {
    pub targets: &'a TemporalTargets,
    pub invalidate_history: bool,
}

pub struct AccumulationPass {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    history_weight: f32,
}

impl AccumulationPass {
    pub fn new(gpu: &GpuContext, history_weight: f32) -> RenderResult<Self> {
        let device = &gpu.device;

        let shader = gpu.create_shader(
            "Temporal Accumulation Shader",
            concat!(
                include_str!("../shaders/frame_constants.wgsl"),
                include_str!("../shaders/taa.wgsl"),
            ),
        )?;

        let texture = |binding, sample_type| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let color = wgpu::TextureSampleType::Float { filterable: true };
        let depth = wgpu::TextureSampleType::Depth;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Temporal Accumulation Bind Group Layout"),
            entries: &[
                FrameConstantHandler::layout_entry(0, wgpu::ShaderStages::COMPUTE),
                uniform_entry(1, wgpu::ShaderStages::COMPUTE),
                texture(2, color),
                texture(3, depth),
                texture(4, color),
                texture(5, color),
                texture(6, depth),
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: COLOR_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Temporal Accumulation Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.checked("Temporal Accumulation Pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Temporal Accumulation Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Temporal Accumulation Params"),
            size: std::mem::size_of::<AccumulationParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("History Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            pipeline,
            layout,
            params_buffer,
            sampler,
            history_weight,
        })
    }

    pub fn history_weight(&self) -> f32 {
        self.history_weight
    }

    pub fn set_history_weight(&mut self, weight: f32) {
        self.history_weight = weight;
    }
}

impl FramePass for AccumulationPass {
    type Inputs<'a> = AccumulationInputs<'a>;

    /// Temporal images belong to [`TemporalTargets`].
    fn on_resolution_changed(&mut self, _gpu: &GpuContext, _width: u32, _height: u32) -> RenderResult<()> {
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>, inputs: AccumulationInputs<'_>) {
        let targets = inputs.targets;
        let params = AccumulationParams {
            history_weight: self.history_weight,
            invalidated: inputs.invalidate_history as u32,
            depth_tolerance: DEPTH_TOLERANCE,
            _pad: 0,
        };
        ctx.gpu
            .queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let (history_color, history_depth) = targets.history_or_current(inputs.invalidate_history);

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Temporal Accumulation Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.constants.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.color().view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.depth().view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&targets.velocity().view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&history_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(&history_depth.view),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(&targets.accumulated().view),
                },
            ],
        });

        {
            let mut pass = ctx.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Temporal Accumulation Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (x, y) = dispatch_size(targets.width(), targets.height(), WORKGROUP);
            pass.dispatch_workgroups(x, y, 1);
        }

        ctx.encoder.copy_texture_to_texture(
            targets.accumulated().texture.as_image_copy(),
            targets.color().texture.as_image_copy(),
            targets.color().size(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn params_are_16_bytes() {
        assert_eq!(std::mem::size_of::<AccumulationParams>(), 16);
    }

    #[test]
    fn invalidated_frame_ignores_history() {
        let current = Vec4::new(0.2, 0.4, 0.6, 1.0);
        let stale = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let out = blend_history(current, stale, Vec4::ZERO, Vec4::ONE, 0.9, true);
        assert_eq!(out, current);

        // Blending against itself is the same no-op.
        let same = blend_history(current, current, current, current, 0.9, false);
        assert!((same - current).abs().max_element() < EPS);
    }

    #[test]
    fn history_is_weighted() {
        let out = blend_history(Vec4::ZERO, Vec4::ONE, Vec4::ZERO, Vec4::ONE, 0.75, false);
        assert!((out - Vec4::splat(0.75)).abs().max_element() < EPS);
    }

    #[test]
    fn history_is_clamped_to_neighborhood() {
        let current = Vec4::splat(0.5);
        let lo = Vec4::splat(0.4);
        let hi = Vec4::splat(0.6);
        let out = blend_history(current, Vec4::ONE, lo, hi, 1.0, false);
        assert!((out - hi).abs().max_element() < EPS);
    }

    #[test]
    fn shader_matches_params_layout() {
        let source = include_str!("../shaders/taa.wgsl");
        for field in ["history_weight: f32", "invalidated: u32", "depth_tolerance: f32"] {
            assert!(source.contains(field), "missing {field}");
        }
    }
}
