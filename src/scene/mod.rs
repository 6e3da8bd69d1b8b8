//! Scene data consumed by the transparency passes.
//!
//! The asset loader is an outside collaborator. What it hands over is a
//! [`Scene`]: a node hierarchy with world transforms, meshes that address
//! ranges of one shared index buffer, and material records. The renderer
//! never walks the hierarchy itself; it asks the [batcher](batch) for a
//! [`SortedScene`] holding only the materials it draws.
//!
//! ```
//! use glam::{Mat4, Vec4};
//! use lucent::scene::{GeometryBuilder, Material, Mesh, Node, Scene};
//!
//! let mut geometry = GeometryBuilder::new();
//! let quad = geometry.push_quad();
//!
//! let scene = Scene::new(
//!     vec![
//!         Node::new(Mat4::IDENTITY).with_mesh(0),
//!         Node::new(Mat4::from_translation(glam::Vec3::Z)).with_mesh(0),
//!     ],
//!     vec![0, 1],
//!     vec![Mesh::new(vec![quad])],
//!     vec![Material::blend(Vec4::new(1.0, 0.0, 0.0, 0.5))],
//! )
//! .unwrap();
//!
//! let sorted = scene.query_draw_calls(|m| m.mode.is_blend());
//! assert_eq!(sorted.material_groups[0].draw_calls[0].transform_indices, vec![0, 1]);
//! ```

mod batcher;
mod geometry;
mod graph;

pub use batcher::{MaterialGroup, SortedDrawCall, SortedScene, batch};
pub use geometry::{GeometryBuilder, SceneGeometry, Vertex};
pub use graph::{Material, MaterialMode, Mesh, MeshDrawCall, Node, Scene, Transform, WorldTransform};
