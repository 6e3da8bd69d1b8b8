//! Groups scene draw calls by material for instanced submission.
//!
//! Identical index ranges drawn with the same material collapse into a
//! single [`SortedDrawCall`] that lists every world transform using it, so
//! a forest of identical panes becomes one instanced draw.

use super::graph::{Material, Scene};

/// One deduplicated index range and every world transform that draws it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortedDrawCall {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: u32,
    /// Indices into [`Scene::world_transforms`], in traversal order.
    pub transform_indices: Vec<u32>,
}

impl SortedDrawCall {
    pub fn instance_count(&self) -> u32 {
        self.transform_indices.len() as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialGroup {
    pub material_index: u32,
    pub draw_calls: Vec<SortedDrawCall>,
}

/// Batcher output: one group per material that matched the query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortedScene {
    pub material_groups: Vec<MaterialGroup>,
}

impl SortedScene {
    pub fn is_empty(&self) -> bool {
        self.material_groups
            .iter()
            .all(|group| group.draw_calls.is_empty())
    }

    /// Total number of instances over every draw call.
    pub fn instance_count(&self) -> usize {
        self.draw_calls().map(|(_, dc)| dc.transform_indices.len()).sum()
    }

    /// Every draw call paired with its material index, in submission order.
    pub fn draw_calls(&self) -> impl Iterator<Item = (u32, &SortedDrawCall)> {
        self.material_groups.iter().flat_map(|group| {
            group
                .draw_calls
                .iter()
                .map(move |dc| (group.material_index, dc))
        })
    }
}

/// Batches every draw call whose material satisfies `predicate`.
///
/// Groups come out in ascending material index and exist even when no node
/// uses the material. Nodes are visited depth-first in pre-order from the
/// root list, which fixes the order of draw calls inside a group and of
/// transform indices inside a draw call.
pub fn batch(scene: &Scene, predicate: impl Fn(&Material) -> bool) -> SortedScene {
    let mut group_of = vec![None; scene.materials().len()];
    let mut material_groups = Vec::new();

    for (index, material) in scene.materials().iter().enumerate() {
        if predicate(material) {
            group_of[index] = Some(material_groups.len());
            material_groups.push(MaterialGroup {
                material_index: index as u32,
                draw_calls: Vec::new(),
            });
        }
    }

    scene.traverse(|_, node| {
        let (Some(mesh), Some(transform)) = (node.mesh, node.world_transform_index) else {
            return;
        };

        for dc in &scene.meshes()[mesh as usize].draw_calls {
            let Some(group) = group_of[dc.material as usize] else {
                continue;
            };
            let draw_calls = &mut material_groups[group].draw_calls;

            match draw_calls.iter_mut().find(|sorted: &&mut SortedDrawCall| {
                sorted.first_index == dc.first_index
                    && sorted.index_count == dc.index_count
                    && sorted.vertex_offset == dc.vertex_offset
            }) {
                Some(existing) => existing.transform_indices.push(transform),
                None => draw_calls.push(SortedDrawCall {
                    first_index: dc.first_index,
                    index_count: dc.index_count,
                    vertex_offset: dc.vertex_offset,
                    transform_indices: vec![transform],
                }),
            }
        }
    });

    SortedScene { material_groups }
}

impl Scene {
    /// Batches the draw calls whose material satisfies `predicate`.
    ///
    /// ```
    /// use lucent::scene::{Material, Scene};
    ///
    /// let scene = Scene::default();
    /// let transparent = scene.query_draw_calls(|m: &Material| m.mode.is_blend());
    /// assert!(transparent.is_empty());
    /// ```
    pub fn query_draw_calls(&self, predicate: impl Fn(&Material) -> bool) -> SortedScene {
        batch(self, predicate)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3, Vec4};

    use super::*;
    use crate::scene::graph::{Mesh, MeshDrawCall, Node};

    fn range(first_index: u32, material: u32) -> MeshDrawCall {
        MeshDrawCall {
            first_index,
            index_count: 6,
            vertex_offset: 0,
            material,
        }
    }

    /// Materials: 0 opaque, 1 blend, 2 blend (unused).
    /// Meshes: 0 = quad with material 1, 1 = cube (opaque) + quad (blend).
    fn sample_scene() -> Scene {
        let materials = vec![
            Material::opaque(Vec4::ONE),
            Material::blend(Vec4::new(1.0, 0.0, 0.0, 0.5)),
            Material::blend(Vec4::new(0.0, 0.0, 1.0, 0.5)),
        ];
        let meshes = vec![
            Mesh::new(vec![range(0, 1)]),
            Mesh::new(vec![range(6, 0), range(0, 1)]),
        ];
        let nodes = vec![
            Node::new(Mat4::IDENTITY).with_children(vec![1, 2]),
            Node::new(Mat4::from_translation(Vec3::X)).with_mesh(0),
            Node::new(Mat4::from_translation(Vec3::Y)).with_mesh(1).with_children(vec![3]),
            Node::new(Mat4::from_translation(Vec3::Z)).with_mesh(0),
        ];
        Scene::new(nodes, vec![0], meshes, materials).unwrap()
    }

    #[test]
    fn shared_ranges_collapse_into_instances() {
        let scene = sample_scene();
        let sorted = scene.query_draw_calls(|m| m.mode.is_blend());

        assert_eq!(sorted.material_groups.len(), 2);
        let blend = &sorted.material_groups[0];
        assert_eq!(blend.material_index, 1);
        assert_eq!(blend.draw_calls.len(), 1);
        assert_eq!(blend.draw_calls[0].first_index, 0);
        assert_eq!(blend.draw_calls[0].transform_indices, vec![0, 1, 2]);
        assert_eq!(sorted.instance_count(), 3);
    }

    #[test]
    fn every_queried_material_gets_a_group() {
        let scene = sample_scene();
        let sorted = scene.query_draw_calls(|m| m.mode.is_blend());

        let unused = &sorted.material_groups[1];
        assert_eq!(unused.material_index, 2);
        assert!(unused.draw_calls.is_empty());
    }

    #[test]
    fn predicate_filters_materials() {
        let scene = sample_scene();
        let opaque = batch(&scene, |m| m.mode.is_opaque());

        assert_eq!(opaque.material_groups.len(), 1);
        assert_eq!(opaque.material_groups[0].material_index, 0);
        assert_eq!(
            opaque.material_groups[0].draw_calls,
            vec![SortedDrawCall {
                first_index: 6,
                index_count: 6,
                vertex_offset: 0,
                transform_indices: vec![1],
            }]
        );
    }

    #[test]
    fn distinct_ranges_stay_separate() {
        let materials = vec![Material::blend(Vec4::ONE)];
        let meshes = vec![
            Mesh::new(vec![range(0, 0)]),
            Mesh::new(vec![MeshDrawCall {
                vertex_offset: 4,
                ..range(0, 0)
            }]),
        ];
        let nodes = vec![
            Node::new(Mat4::IDENTITY).with_mesh(0),
            Node::new(Mat4::IDENTITY).with_mesh(1),
            Node::new(Mat4::IDENTITY).with_mesh(0),
        ];
        let scene = Scene::new(nodes, vec![0, 1, 2], meshes, materials).unwrap();
        let sorted = batch(&scene, |_| true);

        let calls = &sorted.material_groups[0].draw_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].transform_indices, vec![0, 2]);
        assert_eq!(calls[1].vertex_offset, 4);
        assert_eq!(calls[1].transform_indices, vec![1]);
    }

    #[test]
    fn batching_is_deterministic() {
        let scene = sample_scene();
        let first = batch(&scene, |m| m.mode.is_blend());
        let second = batch(&scene, |m| m.mode.is_blend());
        assert_eq!(first, second);
    }

    #[test]
    fn draw_calls_iterates_in_group_order() {
        let scene = sample_scene();
        let all = batch(&scene, |_| true);
        let materials: Vec<u32> = all.draw_calls().map(|(m, _)| m).collect();
        assert_eq!(materials, vec![0, 1]);
        assert!(!all.is_empty());
    }
}
