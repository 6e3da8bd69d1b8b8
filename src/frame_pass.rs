//! The capability interface every stage of the transparency frame implements.

use crate::error::RenderResult;
use crate::gpu::GpuContext;
use crate::render_target::RenderContext;
use crate::scene::Scene;

/// A stage owned by [`TransparencyRenderer`](crate::TransparencyRenderer).
///
/// Stages are plain values composed by the renderer, each declaring the
/// borrowed resources it reads through [`Inputs`](Self::Inputs). The
/// renderer calls them in a fixed order every frame; a stage never reaches
/// for another stage's state on its own.
///
/// # Implementing a stage
///
/// ```ignore
/// struct Tint { pipeline: wgpu::RenderPipeline }
///
/// impl FramePass for Tint {
///     type Inputs<'a> = &'a wgpu::TextureView;
///
///     fn on_resolution_changed(&mut self, _: &GpuContext, _: u32, _: u32) -> RenderResult<()> {
///         Ok(())
///     }
///
///     fn render(&mut self, ctx: &mut RenderContext<'_>, target: Self::Inputs<'_>) {
///         // record into ctx.encoder
///     }
/// }
/// ```
pub trait FramePass {
    /// Resources borrowed from the renderer for one [`render`](Self::render) call.
    type Inputs<'a>;

    /// Prepares scene-dependent data. The default keeps nothing.
    fn attach_to_scene(&mut self, _gpu: &GpuContext, _scene: &Scene) -> RenderResult<()> {
        Ok(())
    }

    /// Drops whatever [`attach_to_scene`](Self::attach_to_scene) built.
    fn detach_scene(&mut self) {}

    /// Reallocates every resolution-dependent resource. Not incremental.
    fn on_resolution_changed(&mut self, gpu: &GpuContext, width: u32, height: u32) -> RenderResult<()>;

    /// Records this stage's commands for the current frame.
    fn render(&mut self, ctx: &mut RenderContext<'_>, inputs: Self::Inputs<'_>);
}
