//! Logical device ownership
//!
//! [`DeviceContext`] is created once from the elected candidate and is the
//! root every other GPU resource is created from. It owns, in teardown order,
//! the swapchain, the resolved queues and the logical device.

use std::ffi::c_char;

use ash::{vk, Device, Instance};

use crate::render::vulkan::device_selection::PhysicalDeviceCandidate;
use crate::render::vulkan::queue_families::{QueueFamily, QueueFamilyIndices, QueueRole};
use crate::render::vulkan::requirements::VulkanRequirements;
use crate::render::vulkan::swapchain::SwapChainContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// First memory type allowed by `type_filter` that has every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    (0u32..)
        .zip(&memory_properties.memory_types[..count])
        .find(|(index, memory_type)| {
            type_filter & (1u32 << *index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index)
}

/// Graphics and presentation queues of the logical device
#[derive(Debug, Clone, Copy)]
pub struct QueueContext {
    graphics: vk::Queue,
    presentation: vk::Queue,
    graphics_family: u32,
    presentation_family: u32,
}

impl QueueContext {
    fn new(device: &Device, indices: &QueueFamilyIndices) -> VulkanResult<Self> {
        let family = |role: QueueRole| {
            indices
                .family(role)
                .map_or_else(|| Err(VulkanError::invalid("Unknown queue role")), QueueFamily::get)
        };
        let graphics_family = family(QueueRole::Graphics)?;
        let presentation_family = family(QueueRole::Presentation)?;

        let graphics = unsafe { device.get_device_queue(graphics_family, 0) };
        let presentation = unsafe { device.get_device_queue(presentation_family, 0) };

        log::info!(
            "Graphics queue from family {}, presentation queue from family {}",
            graphics_family,
            presentation_family
        );

        Ok(Self {
            graphics,
            presentation,
            graphics_family,
            presentation_family,
        })
    }

    /// Queue used for rendering submissions
    pub fn graphics(&self) -> vk::Queue {
        self.graphics
    }

    /// Queue used for presentation
    pub fn presentation(&self) -> vk::Queue {
        self.presentation
    }

    /// Family index of the graphics queue
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Family index of the presentation queue
    pub fn presentation_family(&self) -> u32 {
        self.presentation_family
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
}

impl LogicalDevice {
    fn new(
        instance: &Instance,
        candidate: &PhysicalDeviceCandidate,
        requirements: &VulkanRequirements,
    ) -> VulkanResult<Self> {
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = candidate
            .indices()
            .unique_indices()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions = requirements.extensions.to_cstrings()?;
        let layers = requirements.layers.to_cstrings()?;
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .create_device(candidate.handle(), &create_info, None)
                .map_err(|err| {
                    log::error!("Error while executing vkCreateDevice: {:?}", err);
                    VulkanError::Api(err)
                })?
        };

        Ok(Self { device })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Logical device, queues and swapchain of the elected physical device
pub struct DeviceContext {
    // Field order is teardown order: swapchain, queues, device.
    swapchain: SwapChainContext,
    queues: QueueContext,
    device: LogicalDevice,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
}

impl DeviceContext {
    /// Create the logical device, fetch its queues and build the swapchain
    pub fn new(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        candidate: &PhysicalDeviceCandidate,
        requirements: &VulkanRequirements,
        preferred_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let device = LogicalDevice::new(instance, candidate, requirements)?;
        let queues = QueueContext::new(&device.device, candidate.indices())?;
        let swapchain = SwapChainContext::new(
            instance,
            &device.device,
            surface,
            &candidate.descriptor().swapchain_support,
            candidate.indices(),
            preferred_extent,
        )?;

        Ok(Self {
            swapchain,
            queues,
            device,
            physical_device: candidate.handle(),
            memory_properties: candidate.descriptor().memory_properties,
            limits: candidate.descriptor().properties.limits,
        })
    }

    /// Limits of the physical device, e.g. buffer offset alignments
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Logical device handle
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Resolved queues
    pub fn queues(&self) -> &QueueContext {
        &self.queues
    }

    /// Swapchain and its images
    pub fn swapchain(&self) -> &SwapChainContext {
        &self.swapchain
    }

    /// Physical device the context was created from
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Memory type index for an allocation, `None` if nothing matches
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> Option<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device().device_wait_idle() }.map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        properties
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&properties, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&properties, 0b100, host), Some(2));
        assert_eq!(find_memory_type(&properties, 0b001, host), None);
    }

    #[test]
    fn test_find_memory_type_requires_all_flags() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&properties, u32::MAX, wanted), None);
    }

    #[test]
    fn test_find_memory_type_ignores_padding() {
        let properties = memory_properties(&[]);
        assert_eq!(
            find_memory_type(&properties, u32::MAX, vk::MemoryPropertyFlags::empty()),
            None
        );
    }
}
