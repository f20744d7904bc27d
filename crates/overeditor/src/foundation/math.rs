//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the camera matrices used by the renderer.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}

/// Camera matrix constructors for Vulkan clip space
pub trait Mat4Ext {
    /// Perspective projection mapping depth to [0, 1]
    ///
    /// Expects view space with +Z pointing into the screen and +Y down, which
    /// is what [`Mat4Ext::vulkan_coordinate_transform`] produces from a
    /// right-handed, Y-up view matrix.
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix (camera looks down -Z)
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Flip Y and Z to go from right-handed Y-up to Vulkan's Y-down, Z-forward
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
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
        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        Mat4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, -1.0, 0.0, 0.0,
            0.0, 0.0, -1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector4};

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_look_at_moves_target_onto_negative_z() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(1.0, 2.0, -7.0);
        let view = Mat4::look_at(eye, target, Vec3::y());

        let projected = view.transform_point(&Point3::from(target));
        assert_relative_eq!(projected.coords, Vec3::new(0.0, 0.0, -10.0), epsilon = EPSILON);
    }

    #[test]
    fn test_projection_depth_range() {
        let near = 0.1;
        let far = 100.0;
        let projection = Mat4::perspective(utils::deg_to_rad(60.0), 16.0 / 9.0, near, far)
            * Mat4::vulkan_coordinate_transform();

        // View-space points straight ahead of a right-handed camera
        let at_near = projection * Vector4::new(0.0, 0.0, -near, 1.0);
        let at_far = projection * Vector4::new(0.0, 0.0, -far, 1.0);

        assert_relative_eq!(at_near.z / at_near.w, 0.0, epsilon = EPSILON);
        assert_relative_eq!(at_far.z / at_far.w, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_deg_to_rad() {
        assert_relative_eq!(utils::deg_to_rad(180.0), constants::PI, epsilon = EPSILON);
    }
}
