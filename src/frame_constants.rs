//! Per-frame camera and projection constants in a frames-in-flight ring.
//!
//! Every GPU pass reads the same [`GlobalFrameConstants`] block. The host
//! mutates [`FrameConstants`] through its setters, then each frame:
//!
//! 1. [`FrameConstantHandler::on_begin_frame`] resolves jitter, builds the
//!    view-projection matrices and writes the block into slot `frame_index`.
//! 2. Passes bind [`FrameConstantHandler::binding`], which always targets the
//!    slot written in step 1.
//! 3. [`FrameConstantHandler::on_end_frame`] remembers this frame's
//!    view-projection as the next frame's "previous" one and moves to the
//!    next slot.
//!
//! The ring lets the host record frame `K + 1` while frame `K`'s slot may
//! still be read by the device. Waiting for the device before a slot comes
//! round again is the submission layer's job, not this module's.
//!
//! [`FrameConstants`] is plain data with no device handle so that the whole
//! state machine can be exercised without a GPU.

use std::num::NonZeroU64;

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::error::{ConfigError, RenderResult};
use crate::gpu::GpuContext;
use crate::jitter::{JitterController, apply_jitter};

/// Constants shared by every pass, laid out for a WGSL uniform block.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalFrameConstants {
    /// World to camera space.
    pub view: [[f32; 4]; 4],
    /// Camera to clip space, without jitter.
    pub projection: [[f32; 4]; 4],
    /// Jittered projection times view.
    pub view_projection: [[f32; 4]; 4],
    /// Last completed frame's `view_projection`, or this frame's after invalidation.
    pub previous_view_projection: [[f32; 4]; 4],
    /// `tan(fovy / 2)`, aspect, near, far.
    pub projection_params: [f32; 4],
    /// Normalized sun direction in camera space.
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    /// Width, height, 1/width, 1/height.
    pub viewport: [f32; 4],
    /// Current jitter in `xy`, previous jitter in `zw`.
    pub jitter: [f32; 4],
}

/// Host-side frame constant state and ring bookkeeping.
#[derive(Clone, Debug)]
pub struct FrameConstants {
    view: Mat4,
    projection: Mat4,
    fovy: f32,
    aspect: f32,
    znear: f32,
    zfar: f32,
    sun_direction: Vec3,
    sun_color: Vec3,
    viewport: UVec2,
    history_enabled: bool,
    jitter: JitterController,
    current_view_projection: Mat4,
    last_view_projection: Option<Mat4>,
    params: GlobalFrameConstants,
    num_frames: u32,
    frame_index: u32,
    slot_size: u64,
}

impl FrameConstants {
    /// Creates state for a ring of `frames_in_flight` slots.
    ///
    /// # Arguments
    ///
    /// * `frames_in_flight` - Number of slots, at least 1
    /// * `offset_alignment` - Device `min_uniform_buffer_offset_alignment`
    pub fn new(frames_in_flight: u32, offset_alignment: u32) -> Result<Self, ConfigError> {
        if frames_in_flight == 0 {
            return Err(ConfigError::ZeroFramesInFlight);
        }

        let mut constants = Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            fovy: std::f32::consts::FRAC_PI_3,
            aspect: 1.0,
            znear: 0.1,
            zfar: 100.0,
            sun_direction: Vec3::new(0.0, -1.0, 0.0),
            sun_color: Vec3::ONE,
            viewport: UVec2::ONE,
            history_enabled: true,
            jitter: JitterController::new(),
            current_view_projection: Mat4::IDENTITY,
            last_view_projection: None,
            params: bytemuck::Zeroable::zeroed(),
            num_frames: frames_in_flight,
            frame_index: 0,
            slot_size: aligned_slot_size(offset_alignment),
        };
        constants.rebuild_projection();
        Ok(constants)
    }

    pub fn set_view_matrix(&mut self, view: Mat4) {
        self.view = view;
    }

    /// Sets a right-handed perspective projection with a `[0, 1]` depth range.
    pub fn make_projection(&mut self, fovy: f32, aspect: f32, znear: f32, zfar: f32) {
        let changed = self.fovy != fovy
            || self.aspect != aspect
            || self.znear != znear
            || self.zfar != zfar;
        self.fovy = fovy;
        self.aspect = aspect;
        self.znear = znear;
        self.zfar = zfar;
        self.rebuild_projection();
        if changed {
            self.jitter.invalidate();
        }
    }

    pub fn update_fov(&mut self, fovy: f32) {
        if self.fovy != fovy {
            self.fovy = fovy;
            self.rebuild_projection();
            self.jitter.invalidate();
        }
    }

    pub fn update_aspect(&mut self, aspect: f32) {
        if self.aspect != aspect {
            self.aspect = aspect;
            self.rebuild_projection();
            self.jitter.invalidate();
        }
    }

    /// Sets the render resolution the jitter is normalized against.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let viewport = UVec2::new(width.max(1), height.max(1));
        if self.viewport != viewport {
            self.viewport = viewport;
            self.jitter.invalidate();
        }
    }

    pub fn set_sun_color(&mut self, color: Vec3) {
        self.sun_color = color;
    }

    /// Sets the world-space direction light travels in.
    ///
    /// The direction is normalized here and moved into camera space each
    /// frame with the view matrix current at [`begin_frame`](Self::begin_frame).
    pub fn set_sun_direction(&mut self, direction: Vec3) {
        self.sun_direction = direction.normalize_or_zero();
    }

    /// Enables or disables jitter and history use.
    ///
    /// Turning history back on invalidates it, since the stored frames were
    /// produced without accumulation.
    pub fn set_history_enabled(&mut self, enabled: bool) {
        if enabled && !self.history_enabled {
            self.jitter.invalidate();
        }
        self.history_enabled = enabled;
    }

    /// Forces the next frame to ignore history, e.g. on a camera cut.
    pub fn invalidate_history(&mut self) {
        self.jitter.invalidate();
    }

    pub fn is_history_invalidated(&self) -> bool {
        self.jitter.is_history_invalidated()
    }

    pub fn history_enabled(&self) -> bool {
        self.history_enabled
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    /// Resolves this frame's constants.
    ///
    /// Applies the jitter for the current sequence position, builds the
    /// view-projection and picks the previous view-projection: the last
    /// completed frame's, or this frame's own when history is invalidated.
    pub fn begin_frame(&mut self) -> &GlobalFrameConstants {
        let viewport = self.viewport.as_vec2();
        let jitter = self.jitter.frame_jitter(viewport, self.history_enabled);
        let jittered = apply_jitter(self.projection, Vec2::new(jitter.x, jitter.y));
        let view_projection = jittered * self.view;

        let previous = match self.last_view_projection {
            Some(last) if !self.jitter.is_history_invalidated() => last,
            _ => view_projection,
        };

        let sun = self.view * self.sun_direction.extend(0.0);

        self.current_view_projection = view_projection;
        self.params = GlobalFrameConstants {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
            previous_view_projection: previous.to_cols_array_2d(),
            projection_params: [(self.fovy * 0.5).tan(), self.aspect, self.znear, self.zfar],
            sun_direction: sun.truncate().normalize_or_zero().extend(0.0).to_array(),
            sun_color: self.sun_color.extend(1.0).to_array(),
            viewport: [viewport.x, viewport.y, 1.0 / viewport.x, 1.0 / viewport.y],
            jitter: jitter.to_array(),
        };
        log::trace!(
            "frame constants slot {} jitter {:?} invalidated {}",
            self.frame_index,
            jitter,
            self.jitter.is_history_invalidated()
        );
        &self.params
    }

    /// Retires the frame: stores its view-projection as history, advances
    /// the jitter sequence, clears invalidation and moves to the next slot.
    pub fn end_frame(&mut self) {
        self.last_view_projection = Some(self.current_view_projection);
        self.jitter.end_frame();
        self.frame_index = (self.frame_index + 1) % self.num_frames;
    }

    /// The block produced by the last [`begin_frame`](Self::begin_frame).
    pub fn params(&self) -> &GlobalFrameConstants {
        &self.params
    }

    pub fn view_projection(&self) -> Mat4 {
        self.current_view_projection
    }

    pub fn jitter(&self) -> Vec4 {
        Vec4::from_array(self.params.jitter)
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    /// Aligned byte size of one ring slot.
    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Byte offset of the slot for the current frame.
    pub fn slot_offset(&self) -> u64 {
        self.frame_index as u64 * self.slot_size
    }

    /// Total ring size in bytes.
    pub fn buffer_size(&self) -> u64 {
        self.num_frames as u64 * self.slot_size
    }

    fn rebuild_projection(&mut self) {
        self.projection = Mat4::perspective_rh(self.fovy, self.aspect, self.znear, self.zfar);
    }
}

fn aligned_slot_size(alignment: u32) -> u64 {
    let size = std::mem::size_of::<GlobalFrameConstants>() as u64;
    let alignment = alignment.max(1) as u64;
    size.div_ceil(alignment) * alignment
}

/// [`FrameConstants`] paired with the uniform buffer ring it is written to.
pub struct FrameConstantHandler {
    constants: FrameConstants,
    buffer: wgpu::Buffer,
}

impl FrameConstantHandler {
    /// Allocates `frames_in_flight` aligned slots.
    pub fn new(gpu: &GpuContext, frames_in_flight: u32) -> RenderResult<Self> {
        let constants = FrameConstants::new(frames_in_flight, gpu.uniform_offset_alignment())?;
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Constants Ring"),
            size: constants.buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        log::info!(
            "frame constant ring: {} slots of {} bytes",
            constants.num_frames(),
            constants.slot_size()
        );
        Ok(Self { constants, buffer })
    }

    pub fn constants(&self) -> &FrameConstants {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut FrameConstants {
        &mut self.constants
    }

    /// Resolves this frame's constants and uploads them into the current slot.
    pub fn on_begin_frame(&mut self, queue: &wgpu::Queue) {
        let offset = self.constants.slot_offset();
        let params = *self.constants.begin_frame();
        queue.write_buffer(&self.buffer, offset, bytemuck::bytes_of(&params));
    }

    pub fn on_end_frame(&mut self) {
        self.constants.end_frame();
    }

    /// Binding covering the current frame's slot.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: self.constants.slot_offset(),
            size: NonZeroU64::new(std::mem::size_of::<GlobalFrameConstants>() as u64),
        })
    }

    /// Layout entry matching [`binding`](Self::binding).
    pub fn layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<GlobalFrameConstants>() as u64),
            },
            count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> FrameConstants {
        let mut c = FrameConstants::new(3, 256).unwrap();
        c.set_viewport(640, 480);
        c.make_projection(1.0, 640.0 / 480.0, 0.1, 50.0);
        c.set_view_matrix(Mat4::look_at_rh(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y));
        c
    }

    fn mat(m: &[[f32; 4]; 4]) -> Mat4 {
        Mat4::from_cols_array_2d(m)
    }

    #[test]
    fn gpu_block_size_is_stable() {
        assert_eq!(std::mem::size_of::<GlobalFrameConstants>(), 4 * 64 + 5 * 16);
    }

    #[test]
    fn slot_size_respects_alignment() {
        let c = FrameConstants::new(2, 256).unwrap();
        assert_eq!(c.slot_size(), 512);
        assert_eq!(c.buffer_size(), 1024);

        let tight = FrameConstants::new(2, 16).unwrap();
        assert_eq!(tight.slot_size(), 336);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        assert_eq!(
            FrameConstants::new(0, 256).unwrap_err(),
            ConfigError::ZeroFramesInFlight
        );
    }

    #[test]
    fn frame_index_cycles_through_slots() {
        let mut c = constants();
        let mut offsets = Vec::new();
        for _ in 0..7 {
            c.begin_frame();
            offsets.push(c.slot_offset());
            c.end_frame();
        }
        assert_eq!(offsets, vec![0, 512, 1024, 0, 512, 1024, 0]);
    }

    #[test]
    fn previous_view_projection_is_last_frames_value() {
        let mut c = constants();
        c.begin_frame();
        c.end_frame();

        let first = c.begin_frame().view_projection;
        c.end_frame();

        c.set_view_matrix(Mat4::look_at_rh(Vec3::new(1.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y));
        let second = *c.begin_frame();
        assert_eq!(second.previous_view_projection, first);
        assert_ne!(second.view_projection, first);
    }

    #[test]
    fn first_frame_has_no_history() {
        let mut c = constants();
        let params = *c.begin_frame();
        assert_eq!(params.previous_view_projection, params.view_projection);
        assert_eq!(params.jitter[0], params.jitter[2]);
        assert_eq!(params.jitter[1], params.jitter[3]);
    }

    #[test]
    fn projection_change_invalidates_next_frame_only() {
        let mut c = constants();
        c.begin_frame();
        c.end_frame();
        c.begin_frame();
        c.end_frame();

        c.update_fov(1.3);
        assert!(c.is_history_invalidated());
        let invalidated = *c.begin_frame();
        assert_eq!(
            invalidated.previous_view_projection,
            invalidated.view_projection
        );
        c.end_frame();

        let after = *c.begin_frame();
        assert_eq!(after.previous_view_projection, invalidated.view_projection);
        assert_ne!(after.previous_view_projection, after.view_projection);
    }

    #[test]
    fn unchanged_setters_do_not_invalidate() {
        let mut c = constants();
        c.begin_frame();
        c.end_frame();

        c.update_fov(1.0);
        c.update_aspect(640.0 / 480.0);
        c.set_viewport(640, 480);
        c.make_projection(1.0, 640.0 / 480.0, 0.1, 50.0);
        assert!(!c.is_history_invalidated());
    }

    #[test]
    fn aspect_and_viewport_changes_invalidate() {
        let mut c = constants();
        c.begin_frame();
        c.end_frame();
        c.update_aspect(2.0);
        assert!(c.is_history_invalidated());

        c.begin_frame();
        c.end_frame();
        c.set_viewport(320, 240);
        assert!(c.is_history_invalidated());
    }

    #[test]
    fn reenabling_history_invalidates() {
        let mut c = constants();
        c.begin_frame();
        c.end_frame();

        c.set_history_enabled(false);
        assert!(!c.is_history_invalidated());
        let params = *c.begin_frame();
        assert_eq!(params.jitter, [0.0; 4]);
        c.end_frame();

        c.set_history_enabled(true);
        assert!(c.is_history_invalidated());
    }

    #[test]
    fn projection_params_follow_setters() {
        let mut c = constants();
        let params = *c.begin_frame();
        assert!((params.projection_params[0] - 0.5f32.tan()).abs() < 1e-6);
        assert!((params.projection_params[1] - 640.0 / 480.0).abs() < 1e-6);
        assert_eq!(params.projection_params[2], 0.1);
        assert_eq!(params.projection_params[3], 50.0);
        assert_eq!(params.viewport[0], 640.0);
        assert_eq!(params.viewport[1], 480.0);
    }

    #[test]
    fn view_projection_includes_jitter() {
        let mut c = constants();
        let params = *c.begin_frame();
        let jitter = Vec2::new(params.jitter[0], params.jitter[1]);
        let expected = apply_jitter(mat(&params.projection), jitter) * mat(&params.view);
        assert_eq!(mat(&params.view_projection), expected);
        assert_ne!(jitter, Vec2::ZERO);
    }

    #[test]
    fn sun_direction_is_in_camera_space() {
        let mut c = FrameConstants::new(1, 256).unwrap();
        c.set_view_matrix(Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
        c.set_sun_direction(Vec3::new(2.0, 0.0, 0.0));
        let params = *c.begin_frame();
        let sun = Vec3::new(params.sun_direction[0], params.sun_direction[1], params.sun_direction[2]);
        assert!((sun - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
        assert_eq!(params.sun_direction[3], 0.0);
    }
}
