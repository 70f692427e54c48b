//! Math types and Vulkan-convention matrices
//!
//! World and view space are right-handed with +Y up. [`Mat4Ext::vulkan_coordinate_transform`]
//! flips Y and Z into Vulkan's Y-down, Z-forward clip conventions, and
//! [`Mat4Ext::perspective`] maps depth to `[0, 1]`.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Angle and matrix helpers
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians.to_degrees()
    }

    /// Wrap an angle into `[-pi, pi]`
    pub fn wrap_angle(radians: f32) -> f32 {
        use std::f32::consts::{PI, TAU};
        let wrapped = (radians + PI).rem_euclid(TAU) - PI;
        if wrapped < -PI {
            wrapped + TAU
        } else {
            wrapped
        }
    }
}

/// Constructors for the matrices the renderer needs
pub trait Mat4Ext {
    /// Rotation around the X axis
    fn rotation_x(angle: f32) -> Mat4;

    /// Rotation around the Y axis
    fn rotation_y(angle: f32) -> Mat4;

    /// Perspective projection for a view space already in Vulkan orientation
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Flip Y and Z from the right-handed Y-up view space into Vulkan's orientation
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn rotation_x(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), angle)
    }

    fn rotation_y(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), angle)
    }

    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new_translation(&-eye);

        #[rustfmt::skip]
        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        Mat4::from_diagonal(&nalgebra::Vector4::new(1.0, -1.0, -1.0, 1.0))
    }
}
