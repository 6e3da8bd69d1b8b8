//! A fly-through camera that produces view matrices.
//!
//! The renderer only consumes a view matrix through
//! [`FrameConstants::set_view_matrix`](crate::FrameConstants::set_view_matrix);
//! [`FlyCamera`] is a convenient way for a host to produce one.
//!
//! ```
//! use glam::Vec3;
//! use lucent::FlyCamera;
//!
//! let mut camera = FlyCamera::new(Vec3::new(0.0, 1.0, 5.0), Vec3::NEG_Z);
//! camera.rotate(15.0, -5.0);
//! camera.move_local(Vec3::new(0.0, 0.0, 1.0));
//! let view = camera.view_matrix();
//! ```

use glam::{Mat4, Vec3};

const PITCH_LIMIT: f32 = 89.0;

/// Position plus yaw and pitch, both kept in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlyCamera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    forward: Vec3,
    right: Vec3,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z)
    }
}

impl FlyCamera {
    /// Creates a camera at `position` looking along `forward`.
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        let forward = forward.try_normalize().unwrap_or(Vec3::NEG_Z);
        let mut camera = Self {
            position,
            yaw: forward.z.atan2(forward.x).to_degrees(),
            pitch: forward.y.clamp(-1.0, 1.0).asin().to_degrees(),
            forward,
            right: Vec3::X,
        };
        camera.rotate(0.0, 0.0);
        camera
    }

    /// Places the camera at `position` facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self::new(position, target - position)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Yaw in degrees, in `[0, 360)`.
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in degrees, in `[-89, 89]`.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Moves along the camera's own axes: `x` right, `y` world up, `z` forward.
    pub fn move_local(&mut self, offset: Vec3) {
        self.position += offset.x * self.right + offset.y * Vec3::Y + offset.z * self.forward;
    }

    /// Turns by the given angles in degrees.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw = (self.yaw + delta_yaw).rem_euclid(360.0);
        self.pitch = (self.pitch + delta_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.forward = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.forward.cross(Vec3::Y).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn keeps_initial_direction() {
        let dir = Vec3::new(1.0, 0.5, -2.0).normalize();
        let camera = FlyCamera::new(Vec3::ZERO, dir);
        assert!((camera.forward() - dir).length() < EPS);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = FlyCamera::default();
        camera.rotate(0.0, 500.0);
        assert_eq!(camera.pitch(), 89.0);
        camera.rotate(0.0, -1000.0);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn yaw_wraps() {
        let mut camera = FlyCamera::default();
        camera.rotate(-(camera.yaw() + 10.0), 0.0);
        assert!((camera.yaw() - 350.0).abs() < EPS);
        camera.rotate(20.0, 0.0);
        assert!((camera.yaw() - 10.0).abs() < EPS);
    }

    #[test]
    fn move_local_follows_forward() {
        let mut camera = FlyCamera::new(Vec3::ZERO, Vec3::NEG_Z);
        camera.move_local(Vec3::new(0.0, 0.0, 2.0));
        assert!((camera.position() - Vec3::new(0.0, 0.0, -2.0)).length() < EPS);
        camera.move_local(Vec3::new(1.0, 0.0, 0.0));
        assert!((camera.position() - Vec3::new(1.0, 0.0, -2.0)).length() < EPS);
    }

    #[test]
    fn view_matrix_puts_target_in_front() {
        let camera = FlyCamera::looking_at(Vec3::new(3.0, 2.0, 3.0), Vec3::ZERO);
        let in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(in_view.z < 0.0);
        assert!(in_view.x.abs() < EPS && in_view.y.abs() < EPS);
    }
}
