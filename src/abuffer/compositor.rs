//! Layers the resolved transparency image over the opaque color target.

use crate::error::RenderResult;
use crate::frame_pass::FramePass;
use crate::gpu::GpuContext;
use crate::render_target::RenderContext;

/// `dst = src + dst * (1 - src.a)` for premultiplied sources.
const PREMULTIPLIED_OVER: wgpu::BlendComponent = wgpu::BlendComponent {
    src_factor: wgpu::BlendFactor::One,
    dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
    operation: wgpu::BlendOperation::Add,
};

/// Source and destination of one overlay draw.
pub struct OverlayInputs<'a> {
    /// Premultiplied image from the resolver.
    pub resolved: &'a wgpu::TextureView,
    /// Color target that already holds the opaque scene.
    pub target: &'a wgpu::TextureView,
}

/// Fullscreen pass blending a premultiplied layer onto a color target.
pub struct OverlayCompositor {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

impl OverlayCompositor {
    pub fn new(gpu: &GpuContext, target_format: wgpu::TextureFormat) -> RenderResult<Self> {
        let device = &gpu.device;

        let shader = gpu.create_shader("Overlay Composite Shader", include_str!("../shaders/composite.wgsl"))?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay Composite Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay Composite Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.checked("Overlay Composite Pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Overlay Composite Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(wgpu::BlendState {
                            color: PREMULTIPLIED_OVER,
                            alpha: PREMULTIPLIED_OVER,
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self { pipeline, layout })
    }
}

impl FramePass for OverlayCompositor {
    type Inputs<'a> = OverlayInputs<'a>;

    fn on_resolution_changed(&mut self, _gpu: &GpuContext, _width: u32, _height: u32) -> RenderResult<()> {
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>, inputs: OverlayInputs<'_>) {
        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Overlay Composite Bind Group"),
            layout: &self.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(inputs.resolved),
            }],
        });

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Overlay Composite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: inputs.target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
