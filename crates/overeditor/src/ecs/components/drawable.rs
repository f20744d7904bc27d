//! Drawable geometry and the per-shader draw commands cached on cameras

use std::sync::Arc;

use ash::vk;

use crate::foundation::math::Mat4;
use crate::render::vulkan::descriptors::DescriptorsController;
use crate::render::vulkan::geometry::{GeometryBuffer, GeometryId};
use crate::render::vulkan::shader::{Shader, ShaderId};

/// Geometry drawn with a shader
///
/// Geometry and shaders are shared between drawables.
#[derive(Clone)]
pub struct Drawable {
    /// Vertex and index data
    pub geometry: Arc<GeometryBuffer>,
    /// Program used to draw the geometry
    pub shader: Arc<Shader>,
}

impl Drawable {
    /// Create a drawable
    pub fn new(geometry: Arc<GeometryBuffer>, shader: Arc<Shader>) -> Self {
        Self { geometry, shader }
    }

    /// Identity of the shader, the key draw commands are cached under
    pub fn shader_id(&self) -> ShaderId {
        self.shader.id()
    }
}

/// What a cached command buffer was recorded for: each geometry and its model matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawSignature {
    draws: Vec<(GeometryId, Mat4)>,
}

impl DrawSignature {
    /// Signature of `draws` in draw order
    pub fn new(draws: impl IntoIterator<Item = (GeometryId, Mat4)>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
        }
    }

    /// Number of draws
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    /// Whether nothing is drawn
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

/// Descriptors and a recorded secondary command buffer for one (camera, shader) pair
pub struct DrawingInstructions {
    /// Pool, sets and uniform buffers bound by the command buffer
    pub controller: DescriptorsController,
    /// Secondary command buffer executed inside the camera's render pass
    pub command_buffer: vk::CommandBuffer,
    /// Draws the command buffer currently contains
    pub signature: DrawSignature,
}
