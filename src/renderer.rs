//! The orchestrator tying every transparency and temporal stage together.

use crate::abuffer::{ABuffer, ABufferResolver, ABufferWriter, OverlayCompositor, OverlayInputs, WriterInputs};
use crate::config::RenderConfig;
use crate::error::RenderResult;
use crate::frame_constants::{FrameConstantHandler, FrameConstants};
use crate::frame_pass::FramePass;
use crate::gpu::GpuContext;
use crate::render_target::RenderContext;
use crate::scene::{Scene, SceneGeometry};
use crate::temporal::{AccumulationInputs, AccumulationPass, COLOR_FORMAT, TemporalTargets};

/// Owns every stage of the transparency frame and runs them in order.
///
/// The host keeps the opaque renderer and the submission loop. Each frame it:
///
/// 1. calls [`next_frame`](Self::next_frame),
/// 2. renders opaque color, depth and velocity into [`targets`](Self::targets),
/// 3. calls [`render`](Self::render) on the same encoder and submits.
///
/// All stage resources are sized to the internal render extent, which is the
/// output size scaled by [`RenderConfig::resolution_scale`].
pub struct TransparencyRenderer {
    config: RenderConfig,
    constants: FrameConstantHandler,
    targets: TemporalTargets,
    abuffer: ABuffer,
    writer: ABufferWriter,
    resolver: ABufferResolver,
    compositor: OverlayCompositor,
    accumulation: AccumulationPass,
    output_size: (u32, u32),
}

impl TransparencyRenderer {
    /// Creates every stage for an output of `width` x `height`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, a zero resolution, a fragment list the
    /// device cannot bind, or a pipeline that does not validate.
    pub fn new(gpu: &GpuContext, config: RenderConfig, width: u32, height: u32) -> RenderResult<Self> {
        config.validate()?;
        let (render_width, render_height) = config.render_extent(width, height)?;

        let mut constants = FrameConstantHandler::new(gpu, config.frames_in_flight)?;
        let frame = constants.constants_mut();
        frame.set_viewport(render_width, render_height);
        frame.update_aspect(width as f32 / height as f32);
        frame.set_history_enabled(config.temporal_accumulation);

        let renderer = Self {
            constants,
            targets: TemporalTargets::new(gpu, render_width, render_height)?,
            abuffer: ABuffer::new(gpu, render_width, render_height, config.list_multiplier)?,
            writer: ABufferWriter::new(gpu)?,
            resolver: ABufferResolver::new(gpu, render_width, render_height)?,
            compositor: OverlayCompositor::new(gpu, COLOR_FORMAT)?,
            accumulation: AccumulationPass::new(gpu, config.history_weight)?,
            config,
            output_size: (width, height),
        };

        log::info!(
            "transparency renderer ready: output {width}x{height}, internal {render_width}x{render_height}, {} frames in flight",
            config.frames_in_flight
        );
        Ok(renderer)
    }

    /// Batches the scene's blended draw calls for the writer.
    pub fn attach_to_scene(&mut self, gpu: &GpuContext, scene: &Scene) -> RenderResult<()> {
        self.writer.attach_to_scene(gpu, scene)?;
        self.resolver.attach_to_scene(gpu, scene)?;
        self.compositor.attach_to_scene(gpu, scene)?;
        self.accumulation.attach_to_scene(gpu, scene)?;
        self.constants.constants_mut().invalidate_history();
        Ok(())
    }

    pub fn detach_scene(&mut self) {
        self.writer.detach_scene();
        self.resolver.detach_scene();
        self.compositor.detach_scene();
        self.accumulation.detach_scene();
    }

    /// Reallocates everything sized by the output resolution.
    ///
    /// The A-buffer, the resolver target and the temporal targets are always
    /// rebuilt together so their sizes never disagree.
    pub fn on_resolution_changed(&mut self, gpu: &GpuContext, width: u32, height: u32) -> RenderResult<()> {
        let (render_width, render_height) = self.config.render_extent(width, height)?;

        // Fallible allocations first so a failure leaves the old set intact.
        let abuffer = ABuffer::new(gpu, render_width, render_height, self.config.list_multiplier)?;
        let targets = TemporalTargets::new(gpu, render_width, render_height)?;
        self.resolver.on_resolution_changed(gpu, render_width, render_height)?;
        self.abuffer = abuffer;
        self.targets = targets;

        self.writer.on_resolution_changed(gpu, render_width, render_height)?;
        self.compositor.on_resolution_changed(gpu, render_width, render_height)?;
        self.accumulation.on_resolution_changed(gpu, render_width, render_height)?;

        let frame = self.constants.constants_mut();
        frame.set_viewport(render_width, render_height);
        frame.update_aspect(width as f32 / height as f32);
        frame.invalidate_history();

        self.output_size = (width, height);
        log::info!("resolution changed to {width}x{height} (internal {render_width}x{render_height})");
        Ok(())
    }

    /// Applies a new config, reallocating only when sizes change.
    ///
    /// `frames_in_flight` is fixed at construction; a different value is
    /// ignored with a warning.
    pub fn update_params(&mut self, gpu: &GpuContext, config: RenderConfig) -> RenderResult<()> {
        config.validate()?;
        if config.frames_in_flight != self.config.frames_in_flight {
            log::warn!(
                "frames_in_flight is fixed at {}, ignoring {}",
                self.config.frames_in_flight,
                config.frames_in_flight
            );
        }

        let previous = self.config;
        self.config = RenderConfig {
            frames_in_flight: previous.frames_in_flight,
            ..config
        };

        if previous.needs_reallocation(&self.config) {
            let (width, height) = self.output_size;
            if let Err(e) = self.on_resolution_changed(gpu, width, height) {
                self.config = previous;
                return Err(e);
            }
        }

        self.accumulation.set_history_weight(self.config.history_weight);
        self.constants
            .constants_mut()
            .set_history_enabled(self.config.temporal_accumulation);
        Ok(())
    }

    /// Makes last frame's result the history. Call once before any
    /// rendering for the frame, opaque work included.
    pub fn next_frame(&mut self) {
        self.targets.next_frame();
    }

    /// Records the transparency and accumulation work for this frame.
    ///
    /// Expects the current color, depth and velocity targets to already hold
    /// the opaque scene. Frame constants are uploaded through the queue, so
    /// they land before `encoder` is executed as long as it is submitted
    /// after this call.
    pub fn render(&mut self, gpu: &GpuContext, encoder: &mut wgpu::CommandEncoder, geometry: &SceneGeometry) {
        self.constants.on_begin_frame(&gpu.queue);
        let invalidate_history = self.constants.constants().is_history_invalidated();
        let accumulate = self.constants.constants().history_enabled();

        {
            let mut ctx = RenderContext {
                gpu,
                encoder: &mut *encoder,
                constants: &self.constants,
            };

            self.writer.render(
                &mut ctx,
                WriterInputs {
                    geometry,
                    abuffer: &self.abuffer,
                    depth: &self.targets.depth().view,
                },
            );
            self.resolver.render(&mut ctx, &self.abuffer);
            self.compositor.render(
                &mut ctx,
                OverlayInputs {
                    resolved: &self.resolver.output().view,
                    target: &self.targets.color().view,
                },
            );
            if accumulate {
                self.accumulation.render(
                    &mut ctx,
                    AccumulationInputs {
                        targets: &self.targets,
                        invalidate_history,
                    },
                );
            }
        }

        self.constants.on_end_frame();
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn constants(&self) -> &FrameConstants {
        self.constants.constants()
    }

    /// Camera, projection and sun setters for the next frame.
    pub fn constants_mut(&mut self) -> &mut FrameConstants {
        self.constants.constants_mut()
    }

    pub fn targets(&self) -> &TemporalTargets {
        &self.targets
    }

    pub fn abuffer(&self) -> &ABuffer {
        &self.abuffer
    }

    pub fn writer(&self) -> &ABufferWriter {
        &self.writer
    }

    /// Output resolution, before [`RenderConfig::resolution_scale`].
    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }
}
