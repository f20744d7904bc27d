//! Vulkan backend
//!
//! Every wrapper owns exactly one Vulkan object and destroys it on drop.
//! Owners declare fields in teardown order.

pub mod buffer;
pub mod commands;
pub mod descriptors;
pub mod device_context;
pub mod device_selection;
pub mod error;
pub mod framebuffer;
pub mod geometry;
pub mod instance;
pub mod layout;
pub mod queue_families;
pub mod render_pass;
pub mod requirements;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use device_context::DeviceContext;
pub use error::{VulkanError, VulkanResult};
pub use geometry::{GeometryBuffer, GeometryId};
pub use instance::{VulkanInstance, VulkanSurface};
pub use layout::{
    DescriptorElement, DescriptorLayout, Element, LayoutElement, PushConstantElement, PushConstantsLayout,
    VertexElement, VertexLayout,
};
pub use shader::{Shader, ShaderId, ShaderSource};
