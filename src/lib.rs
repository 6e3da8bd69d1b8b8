//! # Lucent
//!
//! **Order-independent transparency and temporal accumulation for wgpu renderers.**
//!
//! Lucent is the transparency core of a renderer, not a whole one. The host
//! draws the opaque scene and owns submission; Lucent takes over from there:
//!
//! - Batches blended draw calls by material ([`scene::batch`]).
//! - Appends every transparent fragment to a per-pixel linked list, then
//!   sorts and blends each list on the GPU ([`abuffer`]).
//! - Jitters the projection and blends each frame with reprojected history
//!   ([`temporal`], [`jitter`]).
//! - Publishes camera and projection data through a ring of uniform slots,
//!   one per frame in flight ([`FrameConstantHandler`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use lucent::*;
//! use lucent::scene::{GeometryBuilder, Material, Mesh, Node, Scene};
//!
//! fn main() -> Result<(), RenderError> {
//!     let gpu = GpuContext::headless()?;
//!
//!     let mut geometry = GeometryBuilder::new();
//!     let quad = geometry.push_quad().with_material(0);
//!     let scene = Scene::new(
//!         vec![Node::new(Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0))).with_mesh(0)],
//!         vec![0],
//!         vec![Mesh::new(vec![quad])],
//!         vec![Material::blend(Vec4::new(1.0, 0.2, 0.2, 0.5))],
//!     )?;
//!     let geometry = geometry.upload(&gpu);
//!
//!     let mut renderer = TransparencyRenderer::new(&gpu, RenderConfig::default(), 640, 480)?;
//!     renderer.attach_to_scene(&gpu, &scene)?;
//!
//!     renderer.next_frame();
//!     let mut encoder = gpu.device.create_command_encoder(&Default::default());
//!     // ...draw opaque color, depth and velocity into renderer.targets()...
//!     renderer.render(&gpu, &mut encoder, &geometry);
//!     gpu.queue.submit(std::iter::once(encoder.finish()));
//!     Ok(())
//! }
//! ```
//!
//! ## Frame order
//!
//! `next_frame` → opaque (host) → constants begin-frame → A-buffer clear and
//! write → resolve → composite → accumulate → constants end-frame.

pub mod abuffer;
mod camera;
mod config;
mod error;
mod frame_constants;
mod frame_pass;
mod gpu;
pub mod jitter;
mod render_target;
mod renderer;
pub mod scene;
pub mod temporal;

pub use camera::FlyCamera;
pub use config::{DEFAULT_FRAMES_IN_FLIGHT, DEFAULT_LIST_MULTIPLIER, RenderConfig};
pub use error::{ConfigError, RenderError, RenderResult, SceneError};
pub use frame_constants::{FrameConstantHandler, FrameConstants, GlobalFrameConstants};
pub use frame_pass::FramePass;
pub use gpu::GpuContext;
pub use jitter::JitterController;
pub use render_target::{RenderContext, RenderTarget};
pub use renderer::TransparencyRenderer;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, UVec2, Vec2, Vec3, Vec4};
