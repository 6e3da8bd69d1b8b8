//! Builds the per-pixel fragment lists from blended geometry.
//!
//! The writer owns two pipelines:
//!
//! - a compute pipeline that clears the head map to [`SENTINEL`](super::SENTINEL)
//! - a render pipeline with no color targets whose fragment shader appends
//!   into the list buffer
//!
//! The opaque depth buffer is attached read-only with a `Less` test and is
//! also bound to the fragment shader, which repeats the comparison before any
//! storage write.

use wgpu::util::DeviceExt;

use super::layout::LIST_HEADER_SIZE;
use super::{ABuffer, storage_entry, uniform_entry};
use crate::error::RenderResult;
use crate::frame_constants::FrameConstantHandler;
use crate::frame_pass::FramePass;
use crate::gpu::GpuContext;
use crate::render_target::{RenderContext, dispatch_size};
use crate::scene::{Scene, SceneGeometry, SortedScene, Vertex};

const CLEAR_WORKGROUP: (u32, u32) = (8, 8);

/// Per-instance data read by the writer's vertex and fragment stages.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`.
    pub normal: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    /// Metallic, roughness, alpha cutoff, unused.
    pub material: [f32; 4],
}

/// One instanced indexed draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InstancedDraw {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Flattens a batched scene into an instance array and one draw per range.
///
/// Instances of a draw call are contiguous and in the order the batcher
/// listed their transforms.
pub(crate) fn build_instances(scene: &Scene, sorted: &SortedScene) -> (Vec<InstanceData>, Vec<InstancedDraw>) {
    let mut instances = Vec::with_capacity(sorted.instance_count());
    let mut draws = Vec::new();

    for (material_index, dc) in sorted.draw_calls() {
        let material = &scene.materials()[material_index as usize];
        let first_instance = instances.len() as u32;

        for &transform_index in &dc.transform_indices {
            let transform = &scene.world_transforms()[transform_index as usize];
            instances.push(InstanceData {
                model: transform.model.to_cols_array_2d(),
                normal: transform.normal.to_cols_array_2d(),
                base_color: material.base_color_factor.to_array(),
                material: [material.metallic, material.roughness, material.alpha_cutoff, 0.0],
            });
        }

        draws.push(InstancedDraw {
            first_index: dc.first_index,
            index_count: dc.index_count,
            vertex_offset: dc.vertex_offset,
            first_instance,
            instance_count: dc.instance_count(),
        });
    }

    (instances, draws)
}

struct TransparentBatch {
    sorted: SortedScene,
    instance_buffer: wgpu::Buffer,
    draws: Vec<InstancedDraw>,
}

/// Resources the writer reads for one frame.
pub struct WriterInputs<'a> {
    pub geometry: &'a SceneGeometry,
    pub abuffer: &'a ABuffer,
    /// Depth written by the opaque renderer this frame.
    pub depth: &'a wgpu::TextureView,
}

pub struct ABufferWriter {
    clear_pipeline: wgpu::ComputePipeline,
    clear_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    batch: Option<TransparentBatch>,
}

impl ABufferWriter {
    pub fn new(gpu: &GpuContext) -> RenderResult<Self> {
        let device = &gpu.device;

        let clear_shader = gpu.create_shader(
            "ABuffer Clear Shader",
            concat!(
                include_str!("../shaders/abuffer_common.wgsl"),
                include_str!("../shaders/abuffer_clear.wgsl"),
            ),
        )?;

        let clear_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ABuffer Clear Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
            ],
        });

        let clear_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ABuffer Clear Pipeline Layout"),
            bind_group_layouts: &[&clear_layout],
            push_constant_ranges: &[],
        });

        let clear_pipeline = gpu.checked("ABuffer Clear Pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("ABuffer Clear Pipeline"),
                layout: Some(&clear_pipeline_layout),
                module: &clear_shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let shader = gpu.create_shader(
            "ABuffer Write Shader",
            concat!(
                include_str!("../shaders/frame_constants.wgsl"),
                include_str!("../shaders/abuffer_common.wgsl"),
                include_str!("../shaders/abuffer_write.wgsl"),
            ),
        )?;

        let raster = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ABuffer Write Bind Group Layout"),
            entries: &[
                FrameConstantHandler::layout_entry(0, raster),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                storage_entry(2, raster, true),
                storage_entry(3, wgpu::ShaderStages::FRAGMENT, false),
                storage_entry(4, wgpu::ShaderStages::FRAGMENT, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ABuffer Write Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.checked("ABuffer Write Pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("ABuffer Write Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &[Vertex::LAYOUT],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &[],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            clear_pipeline,
            clear_layout,
            pipeline,
            layout,
            batch: None,
        })
    }

    /// The blended draw calls of the attached scene, if any.
    pub fn sorted_scene(&self) -> Option<&SortedScene> {
        self.batch.as_ref().map(|batch| &batch.sorted)
    }

    fn record_clear(&self, ctx: &mut RenderContext<'_>, abuffer: &ABuffer) {
        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ABuffer Clear Bind Group"),
            layout: &self.clear_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: abuffer.params_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: abuffer.head_buffer().as_entire_binding(),
                },
            ],
        });

        {
            let mut pass = ctx.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ABuffer Clear Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.clear_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let layout = abuffer.layout();
            let (x, y) = dispatch_size(layout.width(), layout.height(), CLEAR_WORKGROUP);
            pass.dispatch_workgroups(x, y, 1);
        }

        ctx.encoder
            .clear_buffer(abuffer.list_buffer(), 0, Some(LIST_HEADER_SIZE));
    }
}

impl FramePass for ABufferWriter {
    type Inputs<'a> = WriterInputs<'a>;

    /// Batches the scene's blended materials and uploads their instances.
    fn attach_to_scene(&mut self, gpu: &GpuContext, scene: &Scene) -> RenderResult<()> {
        let sorted = scene.query_draw_calls(|m| m.mode.is_blend());
        let (instances, draws) = build_instances(scene, &sorted);

        if instances.is_empty() {
            log::warn!("attached scene has no blended draw calls");
            self.batch = None;
            return Ok(());
        }

        let instance_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ABuffer Instance Buffer"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::STORAGE,
            });

        log::debug!(
            "transparent batch: {} material groups, {} draws, {} instances",
            sorted.material_groups.len(),
            draws.len(),
            instances.len()
        );

        self.batch = Some(TransparentBatch {
            sorted,
            instance_buffer,
            draws,
        });
        Ok(())
    }

    fn detach_scene(&mut self) {
        self.batch = None;
    }

    /// Buffers are sized by [`ABuffer`]; the writer holds nothing per pixel.
    fn on_resolution_changed(&mut self, _gpu: &GpuContext, _width: u32, _height: u32) -> RenderResult<()> {
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>, inputs: WriterInputs<'_>) {
        self.record_clear(ctx, inputs.abuffer);

        let Some(batch) = &self.batch else {
            return;
        };

        let bind_group = ctx.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ABuffer Write Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ctx.constants.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.abuffer.params_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: batch.instance_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: inputs.abuffer.head_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: inputs.abuffer.list_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(inputs.depth),
                },
            ],
        });

        let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ABuffer Write Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: inputs.depth,
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, inputs.geometry.vertex_buffer.slice(..));
        pass.set_index_buffer(inputs.geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for draw in &batch.draws {
            pass.draw_indexed(
                draw.first_index..draw.first_index + draw.index_count,
                draw.vertex_offset as i32,
                draw.first_instance..draw.first_instance + draw.instance_count,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};

    use super::*;
    use crate::scene::{GeometryBuilder, Material, Mesh, Node};

    #[test]
    fn instance_data_is_160_bytes() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 160);
    }

    #[test]
    fn instances_are_contiguous_per_draw() {
        let mut geometry = GeometryBuilder::new();
        let quad = geometry.push_quad();
        let cube = geometry.push_cube();

        let materials = vec![
            Material::blend(Vec4::new(1.0, 0.0, 0.0, 0.5)),
            Material::opaque(Vec4::ONE),
            Material::blend(Vec4::new(0.0, 1.0, 0.0, 0.25)),
        ];
        let meshes = vec![
            Mesh::new(vec![quad.with_material(0)]),
            Mesh::new(vec![cube.with_material(1), quad.with_material(2)]),
        ];
        let nodes = vec![
            Node::new(Mat4::from_translation(Vec3::X)).with_mesh(0),
            Node::new(Mat4::from_translation(Vec3::Y)).with_mesh(1),
            Node::new(Mat4::from_translation(Vec3::Z)).with_mesh(0),
        ];
        let scene = Scene::new(nodes, vec![0, 1, 2], meshes, materials).unwrap();
        let sorted = scene.query_draw_calls(|m| m.mode.is_blend());

        let (instances, draws) = build_instances(&scene, &sorted);

        assert_eq!(instances.len(), 3);
        assert_eq!(
            draws,
            vec![
                InstancedDraw {
                    first_index: 0,
                    index_count: 6,
                    vertex_offset: 0,
                    first_instance: 0,
                    instance_count: 2,
                },
                InstancedDraw {
                    first_index: 0,
                    index_count: 6,
                    vertex_offset: 0,
                    first_instance: 2,
                    instance_count: 1,
                },
            ]
        );
        assert_eq!(instances[0].base_color, [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(instances[1].model[3], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(instances[2].base_color, [0.0, 1.0, 0.0, 0.25]);
        assert_eq!(instances[2].model[3], [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn opaque_only_scene_has_no_instances() {
        let mut geometry = GeometryBuilder::new();
        let cube = geometry.push_cube();
        let scene = Scene::new(
            vec![Node::new(Mat4::IDENTITY).with_mesh(0)],
            vec![0],
            vec![Mesh::new(vec![cube])],
            vec![Material::opaque(Vec4::ONE)],
        )
        .unwrap();

        let sorted = scene.query_draw_calls(|m| m.mode.is_blend());
        let (instances, draws) = build_instances(&scene, &sorted);
        assert!(instances.is_empty());
        assert!(draws.is_empty());
    }
}
