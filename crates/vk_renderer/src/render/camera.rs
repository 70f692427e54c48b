//! Orbit camera
//!
//! The camera circles the world origin at `distance`, oriented by `yaw` about +Y and
//! `pitch` about +X. World and view space are right-handed with +Y up; the projection
//! matrix carries the Vulkan axis flip (see [`Mat4Ext::vulkan_coordinate_transform`]).

use bytemuck::{Pod, Zeroable};
use std::f32::consts::FRAC_PI_2;

use crate::config::CameraConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};

/// Pitch stays just inside the poles so the look-at basis never degenerates
const PITCH_LIMIT: f32 = FRAC_PI_2 - 1.0e-3;

/// Transform block bound at the uniform binding of every model's descriptor set
///
/// Matrices are column-major, matching GLSL's default `mat4` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Model to world
    pub model: [[f32; 4]; 4],
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip, Vulkan conventions
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Pack the three matrices for upload
    pub fn new(model: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }
}

/// Camera orbiting the origin, driven by mouse drag and scroll
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// Distance from the origin
    pub distance: f32,
    /// Rotation about +Y in radians, kept in `[-pi, pi]`
    pub yaw: f32,
    /// Rotation about +X in radians, kept inside `[-pi/2, pi/2]`
    pub pitch: f32,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Viewport width over height
    pub aspect: f32,
    min_distance: f32,
    max_distance: f32,
    sensitivity: f32,
    zoom_factor: f32,
}

impl OrbitCamera {
    /// Camera in its configured initial pose
    pub fn from_config(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self {
            distance: config.distance,
            yaw: utils::wrap_angle(utils::deg_to_rad(config.yaw_degrees)),
            pitch: utils::deg_to_rad(config.pitch_degrees).clamp(-PITCH_LIMIT, PITCH_LIMIT),
            fov_y: utils::deg_to_rad(config.fov_degrees),
            near: config.near,
            far: config.far,
            aspect,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            sensitivity: config.sensitivity,
            zoom_factor: config.zoom_factor,
        };
        camera.distance = camera.distance.clamp(camera.min_distance, camera.max_distance);
        camera
    }

    /// Orbit by a cursor movement of `(dx, dy)` pixels
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw = utils::wrap_angle(self.yaw - dx * self.sensitivity);
        self.pitch = (self.pitch + dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        log::trace!("Camera yaw {:.3}, pitch {:.3}", self.yaw, self.pitch);
    }

    /// Move toward (positive) or away from (negative) the origin by scroll steps
    pub fn zoom(&mut self, scroll_dy: f32) {
        let distance = self.distance - scroll_dy * self.distance * self.zoom_factor;
        self.distance = distance.clamp(self.min_distance, self.max_distance);
        log::trace!("Camera distance {:.3}", self.distance);
    }

    /// Camera position in world space
    pub fn eye(&self) -> Vec3 {
        let orientation = Mat4::rotation_y(self.yaw) * Mat4::rotation_x(self.pitch);
        orientation.transform_vector(&Vec3::new(0.0, 0.0, -1.0)) * self.distance
    }

    /// World to view transform looking at the origin
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.eye(), Vec3::zeros(), Vec3::y())
    }

    /// Perspective projection with depth in `[0, 1]` and Vulkan's Y-down clip space
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov_y, self.aspect, self.near, self.far) * Mat4::vulkan_coordinate_transform()
    }

    /// Track a new viewport size; zero-sized viewports are ignored
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Transform block for a model with world matrix `model`
    pub fn uniforms(&self, model: &Mat4) -> UniformBufferObject {
        UniformBufferObject::new(model, &self.view_matrix(), &self.projection_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_camera() -> OrbitCamera {
        OrbitCamera::from_config(&CameraConfig::default(), 800.0 / 600.0)
    }

    #[test]
    fn test_initial_eye_distance() {
        let camera = default_camera();
        assert_relative_eq!(camera.eye().norm(), 4.0, epsilon = 1e-5);
        assert_relative_eq!(camera.yaw, -std::f32::consts::FRAC_PI_4, epsilon = 1e-5);
        assert!(camera.eye().y > 0.0);
    }

    #[test]
    fn test_pitch_clamped_for_any_delta() {
        let mut camera = default_camera();
        for dy in [1.0e6, -1.0e6, 3.0, -7.5e4] {
            camera.rotate(0.0, dy);
            assert!(camera.pitch.abs() <= FRAC_PI_2);
            assert_relative_eq!(camera.eye().norm(), camera.distance, epsilon = 1e-4);
            assert!(camera.view_matrix().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_yaw_wraps() {
        let mut camera = default_camera();
        camera.rotate(1.0e5, 0.0);
        assert!(camera.yaw.abs() <= std::f32::consts::PI);
    }

    #[test]
    fn test_zoom_is_proportional_and_clamped() {
        let mut camera = default_camera();
        camera.zoom(1.0);
        assert_relative_eq!(camera.distance, 3.6, epsilon = 1e-5);

        for _ in 0..200 {
            camera.zoom(1.0);
        }
        assert_relative_eq!(camera.distance, 0.5);

        for _ in 0..200 {
            camera.zoom(-1.0);
        }
        assert_relative_eq!(camera.distance, 100.0);
    }

    #[test]
    fn test_view_puts_origin_in_front() {
        let camera = default_camera();
        let origin = camera.view_matrix().transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(origin.z, -camera.distance, epsilon = 1e-4);
    }

    #[test]
    fn test_set_aspect_ignores_zero() {
        let mut camera = default_camera();
        camera.set_aspect(1920, 1080);
        assert_relative_eq!(camera.aspect, 16.0 / 9.0);
        camera.set_aspect(0, 1080);
        assert_relative_eq!(camera.aspect, 16.0 / 9.0);
    }

    #[test]
    fn test_uniforms_are_column_major() {
        let camera = default_camera();
        let model = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let ubo = camera.uniforms(&model);
        assert_eq!(ubo.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 192);
    }
}
