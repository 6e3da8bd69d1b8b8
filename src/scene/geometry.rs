//! Flattened scene geometry: one vertex buffer, one index buffer.
//!
//! Every mesh draw call addresses a sub-range of the shared buffers through
//! `first_index`, `index_count` and `vertex_offset`, which is what lets the
//! batcher compare ranges for equality.
//!
//! # Vertex Layout
//!
//! | Attribute | Format    | Offset | Shader Location |
//! |-----------|-----------|--------|-----------------|
//! | position  | Float32x3 | 0      | 0               |
//! | normal    | Float32x3 | 12     | 1               |
//! | uv        | Float32x2 | 24     | 2               |

use wgpu::util::DeviceExt;

use super::graph::MeshDrawCall;
use crate::gpu::GpuContext;

/// A vertex with position, normal, and texture coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Accumulates meshes into shared vertex and index arrays.
///
/// Indices are stored relative to each mesh's first vertex; the returned
/// [`MeshDrawCall`] carries the base vertex in `vertex_offset`.
#[derive(Clone, Debug, Default)]
pub struct GeometryBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a mesh and returns its range. The material is left at 0.
    pub fn push(&mut self, vertices: &[Vertex], indices: &[u32]) -> MeshDrawCall {
        let draw_call = MeshDrawCall {
            first_index: self.indices.len() as u32,
            index_count: indices.len() as u32,
            vertex_offset: self.vertices.len() as u32,
            material: 0,
        };
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        draw_call
    }

    /// A unit quad on the XY plane facing +Z, centered at the origin.
    pub fn push_quad(&mut self) -> MeshDrawCall {
        let n = [0.0, 0.0, 1.0];
        #[rustfmt::skip]
        let vertices = [
            Vertex::new([-0.5, -0.5, 0.0], n, [0.0, 1.0]),
            Vertex::new([ 0.5, -0.5, 0.0], n, [1.0, 1.0]),
            Vertex::new([ 0.5,  0.5, 0.0], n, [1.0, 0.0]),
            Vertex::new([-0.5,  0.5, 0.0], n, [0.0, 0.0]),
        ];
        self.push(&vertices, &[0, 1, 2, 2, 3, 0])
    }

    /// A unit cube centered at the origin with per-face normals.
    pub fn push_cube(&mut self) -> MeshDrawCall {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (face, (n, u, v)) in FACES.iter().enumerate() {
            let base = face as u32 * 4;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = [
                    n[0] * 0.5 + u[0] * su + v[0] * sv,
                    n[1] * 0.5 + u[1] * su + v[1] * sv,
                    n[2] * 0.5 + u[2] * su + v[2] * sv,
                ];
                vertices.push(Vertex::new(position, *n, [su + 0.5, 0.5 - sv]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        self.push(&vertices, &indices)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn upload(&self, gpu: &GpuContext) -> SceneGeometry {
        SceneGeometry::upload(gpu, &self.vertices, &self.indices)
    }
}

/// GPU copies of the flattened scene buffers.
#[derive(Debug)]
pub struct SceneGeometry {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl SceneGeometry {
    pub fn upload(gpu: &GpuContext, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scene Index Buffer"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        log::info!(
            "uploaded scene geometry: {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );

        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn ranges_are_contiguous() {
        let mut builder = GeometryBuilder::new();
        let quad = builder.push_quad();
        let cube = builder.push_cube();
        let second_quad = builder.push_quad();

        assert_eq!((quad.first_index, quad.index_count, quad.vertex_offset), (0, 6, 0));
        assert_eq!((cube.first_index, cube.index_count, cube.vertex_offset), (6, 36, 4));
        assert_eq!(second_quad.first_index, 42);
        assert_eq!(second_quad.vertex_offset, 28);
        assert_eq!(builder.vertices().len(), 32);
        assert_eq!(builder.indices().len(), 48);
    }

    #[test]
    fn cube_faces_wind_counter_clockwise() {
        let mut builder = GeometryBuilder::new();
        builder.push_cube();
        let v = builder.vertices();

        for tri in builder.indices().chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(v[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = Vec3::from(v[tri[0] as usize].normal);
            assert!((face_normal - stored).length() < 1e-5);
        }
    }

    #[test]
    fn cube_vertices_lie_on_unit_cube() {
        let mut builder = GeometryBuilder::new();
        builder.push_cube();
        for vertex in builder.vertices() {
            for c in vertex.position {
                assert_eq!(c.abs(), 0.5);
            }
        }
    }
}
