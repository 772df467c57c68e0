//! View state: rotation, translation and field of view.

use crate::constants::camera::{DEFAULT_FOV, FAR_PLANE, MAXIMAL_FOV, MINIMAL_FOV, NEAR_PLANE};
use glam::{Mat4, Quat, Vec3};

/// Camera state for the whole renderer. Mutated only under the
/// renderer-wide lock.
pub(crate) struct CameraState {
    pub(crate) rotation: Quat,
    pub(crate) translation: Vec3,
    pub(crate) fov: f32,
}

impl CameraState {
    pub(crate) fn new() -> Self {
        let mut camera = Self {
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            fov: DEFAULT_FOV,
        };
        camera.translation.z = camera.default_translation_z();
        camera
    }

    /// Default camera distance placing the unit volume comfortably in view
    /// at the current field of view.
    pub(crate) fn default_translation_z(&self) -> f32 {
        -4.0 / self.fov
    }

    /// Sets the field of view, clamped to the supported range. The camera
    /// distance is compensated so the volume keeps its apparent size.
    pub(crate) fn set_fov(&mut self, fov: f32) {
        let new_fov = fov.clamp(MINIMAL_FOV, MAXIMAL_FOV);
        let factor = self.fov / new_fov;
        self.fov = new_fov;
        self.translation.z *= factor;
    }

    pub(crate) fn reset(&mut self) {
        self.rotation = Quat::IDENTITY;
        self.translation = Vec3::ZERO;
        self.translation.z = self.default_translation_z();
    }

    /// Inverse view and projection matrices for the kernel.
    pub(crate) fn inverse_matrices(&self, aspect: f32) -> (Mat4, Mat4) {
        let view = Mat4::from_translation(self.translation) * Mat4::from_quat(self.rotation);
        let projection = Mat4::perspective_rh(self.fov, aspect, NEAR_PLANE, FAR_PLANE);
        (view.inverse(), projection.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fov_clamped() {
        let mut camera = CameraState::new();
        camera.set_fov(10.0);
        assert_eq!(camera.fov, MAXIMAL_FOV);
        camera.set_fov(0.0);
        assert_eq!(camera.fov, MINIMAL_FOV);
    }

    #[test]
    fn test_fov_change_compensates_distance() {
        let mut camera = CameraState::new();
        let z_before = camera.translation.z;
        camera.set_fov(camera.fov * 2.0);
        assert!((camera.translation.z - z_before / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut camera = CameraState::new();
        camera.rotation = Quat::from_rotation_y(1.0);
        camera.translation = Vec3::new(1.0, 2.0, 3.0);
        camera.reset();
        assert_eq!(camera.rotation, Quat::IDENTITY);
        assert_eq!(camera.translation.x, 0.0);
        assert_eq!(camera.translation.z, camera.default_translation_z());
    }

    #[test]
    fn test_inverse_matrices_invert() {
        let camera = CameraState::new();
        let (inv_view, inv_proj) = camera.inverse_matrices(16.0 / 9.0);
        let view = Mat4::from_translation(camera.translation) * Mat4::from_quat(camera.rotation);
        let round_trip = view * inv_view;
        assert!(round_trip.abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert!(inv_proj.determinant().abs() > 0.0);
    }
}
