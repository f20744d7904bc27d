//! Camera component
//!
//! A camera owns the uniform buffer holding its view and projection matrices
//! and the draw commands recorded for each shader it has rendered.

use std::collections::HashMap;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::ecs::components::{DrawingInstructions, TransformComponent};
use crate::foundation::math::{utils, Mat4, Mat4Ext};
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::device_context::DeviceContext;
use crate::render::vulkan::layout::DescriptorElement;
use crate::render::vulkan::shader::ShaderId;
use crate::render::vulkan::VulkanResult;

/// Near clipping plane distance
pub const NEAR_PLANE: f32 = 0.1;

/// View and projection matrices as laid out in the camera uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraMatrices {
    /// World to view space, column major
    pub view: [[f32; 4]; 4],
    /// View to clip space, column major
    pub projection: [[f32; 4]; 4],
}

impl CameraMatrices {
    /// Matrices for a camera with the given lens placed at `transform`
    pub fn compute(transform: &TransformComponent, field_of_view: f32, aspect_ratio: f32, depth: f32) -> Self {
        let view = Mat4::look_at(
            transform.position,
            transform.position + transform.forward(),
            transform.up(),
        );
        let projection = Mat4::perspective(utils::deg_to_rad(field_of_view), aspect_ratio, NEAR_PLANE, depth)
            * Mat4::vulkan_coordinate_transform();

        Self {
            view: view.into(),
            projection: projection.into(),
        }
    }

    /// Size of the uniform block in bytes
    pub const fn size() -> u8 {
        std::mem::size_of::<Self>() as u8
    }

    /// Descriptor element shaders declare to receive these matrices
    pub const fn descriptor() -> DescriptorElement {
        DescriptorElement::imported(Self::size(), 1, vk::DescriptorType::UNIFORM_BUFFER)
    }
}

/// Perspective camera rendering into one render pass
pub struct Camera {
    /// Far plane distance
    pub depth: f32,
    /// Vertical field of view in degrees
    pub field_of_view: f32,
    /// Width over height
    pub aspect_ratio: f32,
    render_pass: vk::RenderPass,
    matrices: Buffer,
    instructions: HashMap<ShaderId, DrawingInstructions>,
}

impl Camera {
    /// Create a camera and its matrices buffer
    pub fn new(
        context: &DeviceContext,
        render_pass: vk::RenderPass,
        field_of_view: f32,
        aspect_ratio: f32,
        depth: f32,
    ) -> VulkanResult<Self> {
        let matrices = Buffer::host_visible(
            context,
            std::mem::size_of::<CameraMatrices>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;

        Ok(Self {
            depth,
            field_of_view,
            aspect_ratio,
            render_pass,
            matrices,
            instructions: HashMap::new(),
        })
    }

    /// Matrices for this camera at `transform`
    pub fn matrices_for(&self, transform: &TransformComponent) -> CameraMatrices {
        CameraMatrices::compute(transform, self.field_of_view, self.aspect_ratio, self.depth)
    }

    /// Write the current matrices into the persistently mapped uniform buffer
    pub fn update_matrices(&mut self, transform: &TransformComponent) -> VulkanResult<()> {
        let matrices = self.matrices_for(transform);
        self.matrices.write(&[matrices])
    }

    /// Render pass this camera renders into
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Matrices buffer alongside the per-shader draw command cache
    pub fn draw_cache_mut(&mut self) -> (&Buffer, &mut HashMap<ShaderId, DrawingInstructions>) {
        (&self.matrices, &mut self.instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_matrices_block_is_two_mat4() {
        assert_eq!(CameraMatrices::size(), 128);
        assert!(CameraMatrices::descriptor().is_imported());
    }

    #[test]
    fn test_point_ahead_of_camera_lands_in_clip_volume() {
        let transform = TransformComponent::from_position(Vec3::new(0.0, 0.0, -5.0));
        let matrices = CameraMatrices::compute(&transform, 60.0, 16.0 / 9.0, 100.0);

        let view = Mat4::from(matrices.view);
        let projection = Mat4::from(matrices.projection);
        let clip = projection * view * Vector4::new(0.0, 0.0, 5.0, 1.0);
        let ndc = clip.xyz() / clip.w;

        assert!(clip.w > 0.0);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_point_above_camera_is_up_on_screen() {
        let transform = TransformComponent::identity();
        let matrices = CameraMatrices::compute(&transform, 90.0, 1.0, 100.0);

        let clip = Mat4::from(matrices.projection) * Mat4::from(matrices.view) * Vector4::new(0.0, 1.0, 5.0, 1.0);

        // Vulkan clip space has +Y pointing down
        assert!(clip.y / clip.w < 0.0);
    }
}
