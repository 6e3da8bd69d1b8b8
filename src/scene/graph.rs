//! Node hierarchy, meshes and materials as handed over by an asset loader.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::error::SceneError;

/// How a material participates in rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MaterialMode {
    #[default]
    Opaque,
    /// Alpha blended; drawn through the fragment lists.
    Blend,
    /// Alpha tested against [`Material::alpha_cutoff`].
    Mask,
}

impl MaterialMode {
    pub fn is_blend(self) -> bool {
        self == MaterialMode::Blend
    }

    /// Opaque and alpha-tested materials both go through the opaque renderer.
    pub fn is_opaque(self) -> bool {
        !self.is_blend()
    }
}

/// Scalar material factors. Textures belong to the shading collaborator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub mode: MaterialMode,
    pub base_color_factor: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            mode: MaterialMode::Opaque,
            base_color_factor: Vec4::new(0.0, 0.0, 0.0, 1.0),
            metallic: 0.1,
            roughness: 0.9,
            alpha_cutoff: 0.5,
        }
    }
}

impl Material {
    /// A blended material with the given premultiplication-free color.
    pub fn blend(base_color: Vec4) -> Self {
        Self {
            mode: MaterialMode::Blend,
            base_color_factor: base_color,
            ..Default::default()
        }
    }

    pub fn opaque(base_color: Vec4) -> Self {
        Self {
            mode: MaterialMode::Opaque,
            base_color_factor: base_color,
            ..Default::default()
        }
    }
}

/// An indexed range inside the shared scene index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshDrawCall {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    pub material: u32,
}

impl MeshDrawCall {
    /// The same range drawn with another material.
    pub fn with_material(mut self, material: u32) -> Self {
        self.material = material;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub draw_calls: Vec<MeshDrawCall>,
}

impl Mesh {
    pub fn new(draw_calls: Vec<MeshDrawCall>) -> Self {
        Self { draw_calls }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Transform relative to the parent node.
    pub transform: Mat4,
    pub mesh: Option<u32>,
    pub children: Vec<u32>,
    /// Slot in [`Scene::world_transforms`], set for mesh-owning nodes.
    pub world_transform_index: Option<u32>,
}

impl Node {
    pub fn new(transform: Mat4) -> Self {
        Self {
            transform,
            mesh: None,
            children: Vec::new(),
            world_transform_index: None,
        }
    }

    pub fn with_mesh(mut self, mesh: u32) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_children(mut self, children: Vec<u32>) -> Self {
        self.children = children;
        self
    }
}

/// Model matrix of a mesh-owning node and its normal matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldTransform {
    pub model: Mat4,
    /// `inverse(model)` transposed.
    pub normal: Mat4,
}

impl WorldTransform {
    pub fn new(model: Mat4) -> Self {
        Self {
            model,
            normal: model.inverse().transpose(),
        }
    }
}

/// Position, rotation and scale that build a node matrix.
///
/// ```
/// use glam::{Quat, Vec3};
/// use lucent::scene::Transform;
///
/// let transform = Transform::new()
///     .position(Vec3::new(0.0, 2.0, -5.0))
///     .rotation(Quat::from_rotation_y(0.5))
///     .uniform_scale(2.0);
/// let node_matrix = transform.matrix();
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Scale, then rotation, then translation.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.matrix()
    }
}

/// A validated scene with precomputed world transforms.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    nodes: Vec<Node>,
    root_nodes: Vec<u32>,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    world_transforms: Vec<WorldTransform>,
}

impl Scene {
    /// Validates every index and flattens the hierarchy.
    ///
    /// World transforms are assigned to mesh-owning nodes in depth-first
    /// pre-order over `root_nodes`. Any incoming `world_transform_index` is
    /// overwritten. A node reachable twice (shared child or cycle) is
    /// rejected, as are nodes that no root reaches but that own a mesh.
    pub fn new(
        mut nodes: Vec<Node>,
        root_nodes: Vec<u32>,
        meshes: Vec<Mesh>,
        materials: Vec<Material>,
    ) -> Result<Self, SceneError> {
        for (mesh_index, mesh) in meshes.iter().enumerate() {
            for (draw_call, dc) in mesh.draw_calls.iter().enumerate() {
                if dc.material as usize >= materials.len() {
                    return Err(SceneError::InvalidMaterial {
                        mesh: mesh_index as u32,
                        draw_call,
                        material: dc.material,
                    });
                }
            }
        }

        for (index, node) in nodes.iter().enumerate() {
            if let Some(mesh) = node.mesh.filter(|&m| m as usize >= meshes.len()) {
                return Err(SceneError::InvalidMesh {
                    node: index as u32,
                    mesh,
                });
            }
            if let Some(&child) = node.children.iter().find(|&&c| c as usize >= nodes.len()) {
                return Err(SceneError::InvalidNode(child));
            }
        }

        for node in &mut nodes {
            node.world_transform_index = None;
        }

        let mut visited = vec![false; nodes.len()];
        let mut world_transforms = Vec::new();
        let mut stack: Vec<(u32, Mat4)> = root_nodes
            .iter()
            .rev()
            .map(|&root| (root, Mat4::IDENTITY))
            .collect();

        while let Some((index, parent)) = stack.pop() {
            let slot = visited
                .get_mut(index as usize)
                .ok_or(SceneError::InvalidNode(index))?;
            if *slot {
                return Err(SceneError::NodeReused(index));
            }
            *slot = true;

            let node = &mut nodes[index as usize];
            let world = parent * node.transform;
            if node.mesh.is_some() {
                node.world_transform_index = Some(world_transforms.len() as u32);
                world_transforms.push(WorldTransform::new(world));
            }
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }

        let unreachable = nodes
            .iter()
            .zip(&visited)
            .filter(|(node, seen)| !**seen && node.mesh.is_some())
            .count();
        if unreachable > 0 {
            log::warn!("{unreachable} mesh nodes are not reachable from any root and will not draw");
        }

        log::debug!(
            "scene: {} nodes, {} meshes, {} materials, {} world transforms",
            nodes.len(),
            meshes.len(),
            materials.len(),
            world_transforms.len()
        );

        Ok(Self {
            nodes,
            root_nodes,
            meshes,
            materials,
            world_transforms,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn root_nodes(&self) -> &[u32] {
        &self.root_nodes
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, index: u32) -> Option<&Material> {
        self.materials.get(index as usize)
    }

    pub fn world_transforms(&self) -> &[WorldTransform] {
        &self.world_transforms
    }

    pub fn world_transform(&self, index: u32) -> Option<&WorldTransform> {
        self.world_transforms.get(index as usize)
    }

    /// Visits every root-reachable node depth-first, parents before children.
    pub fn traverse(&self, mut visit: impl FnMut(u32, &Node)) {
        let mut stack: Vec<u32> = self.root_nodes.iter().rev().copied().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            visit(index, node);
            stack.extend(node.children.iter().rev());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh(material: u32) -> Mesh {
        Mesh::new(vec![MeshDrawCall {
            first_index: 0,
            index_count: 6,
            vertex_offset: 0,
            material,
        }])
    }

    #[test]
    fn world_transforms_follow_preorder() {
        let nodes = vec![
            Node::new(Mat4::from_translation(Vec3::X)).with_children(vec![1, 2]),
            Node::new(Mat4::from_translation(Vec3::Y)).with_mesh(0),
            Node::new(Mat4::from_translation(Vec3::Z)).with_mesh(0),
            Node::new(Mat4::IDENTITY).with_mesh(0),
        ];
        let scene = Scene::new(nodes, vec![3, 0], vec![quad_mesh(0)], vec![Material::default()]).unwrap();

        assert_eq!(scene.nodes()[3].world_transform_index, Some(0));
        assert_eq!(scene.nodes()[1].world_transform_index, Some(1));
        assert_eq!(scene.nodes()[2].world_transform_index, Some(2));
        assert_eq!(scene.nodes()[0].world_transform_index, None);

        let child = scene.world_transform(1).unwrap().model;
        assert_eq!(child.w_axis.truncate(), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn normal_matrix_is_inverse_transpose() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let transform = WorldTransform::new(model);
        let n = transform.normal.transform_vector3(Vec3::X);
        assert!((n - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn missing_material_is_rejected() {
        let err = Scene::new(
            vec![Node::new(Mat4::IDENTITY).with_mesh(0)],
            vec![0],
            vec![quad_mesh(3)],
            vec![Material::default()],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SceneError::InvalidMaterial {
                mesh: 0,
                draw_call: 0,
                material: 3
            }
        );
    }

    #[test]
    fn bad_indices_are_rejected() {
        let missing_mesh = Scene::new(vec![Node::new(Mat4::IDENTITY).with_mesh(1)], vec![0], vec![], vec![]);
        assert_eq!(missing_mesh.unwrap_err(), SceneError::InvalidMesh { node: 0, mesh: 1 });

        let missing_child = Scene::new(
            vec![Node::new(Mat4::IDENTITY).with_children(vec![5])],
            vec![0],
            vec![],
            vec![],
        );
        assert_eq!(missing_child.unwrap_err(), SceneError::InvalidNode(5));

        let missing_root = Scene::new(vec![], vec![0], vec![], vec![]);
        assert_eq!(missing_root.unwrap_err(), SceneError::InvalidNode(0));
    }

    #[test]
    fn cycles_are_rejected() {
        let nodes = vec![
            Node::new(Mat4::IDENTITY).with_children(vec![1]),
            Node::new(Mat4::IDENTITY).with_children(vec![0]),
        ];
        assert_eq!(
            Scene::new(nodes, vec![0], vec![], vec![]).unwrap_err(),
            SceneError::NodeReused(0)
        );
    }

    #[test]
    fn traverse_matches_transform_order() {
        let nodes = vec![
            Node::new(Mat4::IDENTITY).with_children(vec![2, 1]).with_mesh(0),
            Node::new(Mat4::IDENTITY).with_mesh(0),
            Node::new(Mat4::IDENTITY).with_mesh(0),
        ];
        let scene = Scene::new(nodes, vec![0], vec![quad_mesh(0)], vec![Material::default()]).unwrap();

        let mut order = Vec::new();
        scene.traverse(|index, node| order.push((index, node.world_transform_index)));
        assert_eq!(order, vec![(0, Some(0)), (2, Some(1)), (1, Some(2))]);
    }

    #[test]
    fn transform_builder_composes_trs() {
        let matrix = Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
            .uniform_scale(2.0)
            .matrix();
        let p = matrix.transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-6);
    }
}
