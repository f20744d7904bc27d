//! Vulkan swapchain management
//!
//! Format, present mode and extent selection are pure functions over the
//! queried [`SwapchainSupportDetails`]; [`SwapChainContext`] owns the
//! swapchain and one view per image. The window is fixed-size, so the
//! swapchain is created once and never recreated.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};

use crate::render::vulkan::queue_families::QueueFamilyIndices;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Fallback format when the surface has no preference
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Everything a surface reports about swapchain support on one device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Query support details of `device` for `surface`
    pub fn query(
        surface_loader: &Surface,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Pick the surface format.
///
/// A single `UNDEFINED` entry means the surface accepts anything, in which
/// case BGRA8 unorm with sRGB non-linear color space is used. Otherwise the
/// first reported format wins. `None` if nothing is reported.
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(DEFAULT_SURFACE_FORMAT),
        [first, ..] => Some(*first),
    }
}

/// Mailbox when available, FIFO otherwise (FIFO support is guaranteed)
pub fn select_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Current extent if the surface defines one, else `preferred` clamped into bounds
pub fn select_extent(capabilities: &vk::SurfaceCapabilitiesKHR, preferred: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: preferred.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: preferred.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped when the surface reports a maximum
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// A swapchain image and its color view
#[derive(Debug, Clone, Copy)]
pub struct ImageContext {
    image: vk::Image,
    view: vk::ImageView,
}

impl ImageContext {
    /// Swapchain image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// 2D color view over the image
    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

/// Swapchain plus per-image views, destroyed views first
pub struct SwapChainContext {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<ImageContext>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl SwapChainContext {
    /// Create the swapchain for an already created logical device
    pub fn new(
        instance: &Instance,
        device: &Device,
        surface: vk::SurfaceKHR,
        support: &SwapchainSupportDetails,
        indices: &QueueFamilyIndices,
        preferred_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let format = select_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("There are no surface formats available".to_string()))?;
        let present_mode = select_present_mode(&support.present_modes);
        let extent = select_extent(&support.capabilities, preferred_extent);
        let image_count = select_image_count(&support.capabilities);

        log::info!(
            "Swapchain: {:?} / {:?}, {:?}, {}x{}, {} images",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count
        );

        let graphics = indices.graphics();
        let presentation = indices.presentation();
        let family_indices = [graphics.unwrap_or_default(), presentation.unwrap_or_default()];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if graphics == presentation {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let loader = SwapchainLoader::new(instance, device);
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let mut context = Self {
            device: device.clone(),
            loader,
            swapchain,
            images: Vec::with_capacity(images.len()),
            format,
            present_mode,
            extent,
        };

        for image in images {
            let view = create_color_view(device, image, format.format)?;
            context.images.push(ImageContext { image, view });
        }

        Ok(context)
    }

    /// Block until the next image is available, signalling `semaphore`
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(|err| {
                    log::error!("Error while executing vkAcquireNextImageKHR: {:?}", err);
                    VulkanError::Api(err)
                })?
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    /// Queue `image_index` for presentation once `wait` is signalled
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.loader
                .queue_present(queue, &present_info)
                .map_err(|err| {
                    log::error!("Error while executing vkQueuePresentKHR: {:?}", err);
                    VulkanError::Api(err)
                })?;
        }
        Ok(())
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Images and their views
    pub fn images(&self) -> &[ImageContext] {
        &self.images
    }

    /// Selected surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Selected present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for SwapChainContext {
    fn drop(&mut self) {
        unsafe {
            for image in &self.images {
                self.device.destroy_image_view(image.view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_color_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.map_err(VulkanError::Api)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 800, height: 600 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    #[test]
    fn test_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_undefined_format_uses_default() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(select_surface_format(&formats), Some(DEFAULT_SURFACE_FORMAT));
    }

    #[test]
    fn test_first_defined_format_is_used() {
        let first = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let second = DEFAULT_SURFACE_FORMAT;
        assert_eq!(select_surface_format(&[first, second]), Some(first));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn test_extent_clamped_into_bounds() {
        let capabilities = bounded_capabilities();

        let preferred = vk::Extent2D { width: 1920, height: 1080 };
        assert_eq!(select_extent(&capabilities, preferred), preferred);

        let oversized = vk::Extent2D { width: 4096, height: 100 };
        assert_eq!(
            select_extent(&capabilities, oversized),
            vk::Extent2D { width: 1920, height: 600 }
        );
    }

    #[test]
    fn test_defined_extent_returned_unchanged() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1280, height: 720 },
            ..bounded_capabilities()
        };
        let preferred = vk::Extent2D { width: 1920, height: 1080 };
        assert_eq!(
            select_extent(&capabilities, preferred),
            vk::Extent2D { width: 1280, height: 720 }
        );
    }

    #[test]
    fn test_image_count() {
        let mut capabilities = bounded_capabilities();
        assert_eq!(select_image_count(&capabilities), 3);

        capabilities.max_image_count = 2;
        assert_eq!(select_image_count(&capabilities), 2);
    }
}
