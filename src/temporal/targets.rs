//! Images that persist across frames for temporal accumulation.

use super::ping_pong::{HistorySlot, PingPong};
use crate::error::{ConfigError, RenderResult};
use crate::gpu::GpuContext;
use crate::render_target::RenderTarget;

/// Working and history color. Also the format read back by hosts.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Screen-space motion in UV units, `current - previous`.
pub const VELOCITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Ping-ponged color and depth, plus velocity and the accumulation output.
///
/// Each frame the current slot is first filled with a fresh render (opaque
/// scene, then transparency), accumulation blends it with the other slot,
/// and the blended result is copied back into the current slot. After
/// [`next_frame`](Self::next_frame) that slot becomes history.
pub struct TemporalTargets {
    color: PingPong<RenderTarget>,
    depth: PingPong<RenderTarget>,
    velocity: RenderTarget,
    accumulated: RenderTarget,
    width: u32,
    height: u32,
}

impl TemporalTargets {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height }.into());
        }

        let color = PingPong::from_fn(|slot| {
            let label = match slot {
                HistorySlot::First => "Temporal Color A",
                HistorySlot::Second => "Temporal Color B",
            };
            RenderTarget::new(
                gpu,
                label,
                width,
                height,
                COLOR_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
            )
        });

        let depth = PingPong::from_fn(|slot| {
            let label = match slot {
                HistorySlot::First => "Temporal Depth A",
                HistorySlot::Second => "Temporal Depth B",
            };
            RenderTarget::new(
                gpu,
                label,
                width,
                height,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            )
        });

        let velocity = RenderTarget::new(
            gpu,
            "Velocity",
            width,
            height,
            VELOCITY_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        let accumulated = RenderTarget::new(
            gpu,
            "Accumulated Color",
            width,
            height,
            COLOR_FORMAT,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );

        log::info!("allocated temporal targets {width}x{height}");

        Ok(Self {
            color,
            depth,
            velocity,
            accumulated,
            width,
            height,
        })
    }

    /// Makes last frame's result the history. Call once, before rendering.
    pub fn next_frame(&mut self) {
        self.color.toggle();
        self.depth.toggle();
        log::trace!("temporal slot now {:?}", self.color.current_slot());
    }

    /// Replaces every image, both slots included. History is lost.
    pub fn on_resolution_changed(&mut self, gpu: &GpuContext, width: u32, height: u32) -> RenderResult<()> {
        *self = Self::new(gpu, width, height)?;
        Ok(())
    }

    pub fn current_slot(&self) -> HistorySlot {
        self.color.current_slot()
    }

    /// This frame's working color target.
    pub fn color(&self) -> &RenderTarget {
        self.color.current()
    }

    /// This frame's depth target.
    pub fn depth(&self) -> &RenderTarget {
        self.depth.current()
    }

    /// Last frame's accumulated color.
    pub fn history_color(&self) -> &RenderTarget {
        self.color.history()
    }

    pub fn history_depth(&self) -> &RenderTarget {
        self.depth.history()
    }

    /// History color and depth, or this frame's own when invalidated.
    pub fn history_or_current(&self, invalidated: bool) -> (&RenderTarget, &RenderTarget) {
        (
            self.color.history_or_current(invalidated),
            self.depth.history_or_current(invalidated),
        )
    }

    pub fn velocity(&self) -> &RenderTarget {
        &self.velocity
    }

    /// Output of the accumulation pass before it is copied back.
    pub fn accumulated(&self) -> &RenderTarget {
        &self.accumulated
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
