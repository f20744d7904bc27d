//! Transform component for the ECS system
//!
//! Pure data: position, rotation and scale in a right-handed, Y-up world.

use crate::foundation::math::{Mat4, Quat, Vec3};

/// ECS Transform component
#[derive(Debug, Clone, PartialEq)]
pub struct TransformComponent {
    /// World space position
    pub position: Vec3,

    /// World space rotation
    pub rotation: Quat,

    /// Scale factors along the local axes
    pub scale: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl TransformComponent {
    /// Create identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create from position only
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Builder pattern: Set position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Builder pattern: Set rotation from quaternion
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Builder pattern: Set rotation from Euler angles (radians, roll/pitch/yaw)
    pub fn with_rotation_euler(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = Quat::from_euler_angles(x, y, z);
        self
    }

    /// Builder pattern: Set rotation from axis-angle
    pub fn with_rotation_axis_angle(mut self, axis: Vec3, angle: f32) -> Self {
        self.rotation = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle);
        self
    }

    /// Builder pattern: Set uniform scale
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Builder pattern: Set scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Local +Z in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::z()
    }

    /// Local +Y in world space
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::y()
    }

    /// Local +X in world space
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::x()
    }

    /// Model matrix, T * R * S
    pub fn to_matrix(&self) -> Mat4 {
        let translation = Mat4::new_translation(&self.position);
        let rotation = self.rotation.to_homogeneous();
        let scale = Mat4::new_nonuniform_scaling(&self.scale);
        translation * rotation * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_transform_identity() {
        let transform = TransformComponent::identity();
        assert_eq!(transform.position, Vec3::zeros());
        assert_eq!(transform.scale, Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(transform.to_matrix(), Mat4::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_identity_axes() {
        let transform = TransformComponent::identity();
        assert_relative_eq!(transform.forward(), Vec3::z(), epsilon = EPSILON);
        assert_relative_eq!(transform.up(), Vec3::y(), epsilon = EPSILON);
        assert_relative_eq!(transform.right(), Vec3::x(), epsilon = EPSILON);
    }

    #[test]
    fn test_axes_follow_rotation() {
        let transform = TransformComponent::identity().with_rotation_axis_angle(Vec3::y(), FRAC_PI_2);

        // Quarter turn about +Y takes +Z to +X
        assert_relative_eq!(transform.forward(), Vec3::x(), epsilon = EPSILON);
        assert_relative_eq!(transform.up(), Vec3::y(), epsilon = EPSILON);
        assert_relative_eq!(transform.right(), -Vec3::z(), epsilon = EPSILON);
    }

    #[test]
    fn test_matrix_scales_then_rotates_then_translates() {
        let transform = TransformComponent::from_position(Vec3::new(10.0, 0.0, 20.0))
            .with_rotation_axis_angle(Vec3::y(), FRAC_PI_2)
            .with_uniform_scale(2.0);

        let moved = transform.to_matrix().transform_point(&Point3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(moved.coords, Vec3::new(12.0, 0.0, 20.0), epsilon = EPSILON);
    }
}
