//! Vulkan entry point, instance and surface
//!
//! Instance requirements are checked against what the loader reports. Missing
//! ones are logged and left out of the enabled set instead of failing.

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};

use crate::core::config::VulkanRendererConfig;
use crate::render::vulkan::requirements::{raw_name, Requirements, VulkanRequirements};
use crate::render::vulkan::{VulkanError, VulkanResult};

const ENGINE_NAME: &str = "OverEditor";

/// Instance requirements for a window that needs `window_extensions`
pub fn instance_requirements(config: &VulkanRendererConfig, window_extensions: &[String]) -> VulkanRequirements {
    let mut extensions: Vec<String> = window_extensions.to_vec();
    let mut layers = Vec::new();
    if config.validation_enabled() {
        extensions.push(DebugUtils::name().to_string_lossy().into_owned());
        layers.extend(config.validation_layers.iter().cloned());
    }
    VulkanRequirements::new(Requirements::new(extensions), Requirements::new(layers))
}

/// Vulkan instance with an optional validation messenger
pub struct VulkanInstance {
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Surface,
    instance: Instance,
    // Keeps the loader library alive
    #[allow(dead_code)]
    entry: Entry,
}

impl VulkanInstance {
    /// Load Vulkan and create an instance enabling every available requirement
    pub fn new(config: &VulkanRendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {}", e)))?;

        let available_extensions: Vec<String> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|properties| raw_name(&properties.extension_name))
            .collect();
        let available_layers: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?
            .iter()
            .map(|properties| raw_name(&properties.layer_name))
            .collect();

        let requirements = instance_requirements(config, window_extensions);
        let status = requirements.check(&available_extensions, &available_layers);
        log::info!("Instance requirements:");
        status.log_errors();
        let enabled = requirements.retain_available(&available_extensions, &available_layers);

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let engine_name = CString::new(ENGINE_NAME)
            .map_err(|_| VulkanError::InitializationFailed("Engine name contains NUL".to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let extensions = enabled.extensions.to_cstrings()?;
        let layers = enabled.layers.to_cstrings()?;
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry.create_instance(&create_info, None).map_err(|err| {
                log::error!("Error while executing vkCreateInstance: {:?}", err);
                VulkanError::Api(err)
            })?
        };

        let debug_name = DebugUtils::name().to_string_lossy();
        let debug = if enabled.extensions.names().iter().any(|name| *name == debug_name) {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(err) => {
                    log::warn!("Validation messages unavailable: {}", err);
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);
        log::info!(
            "Vulkan instance created ({} extension(s), {} layer(s))",
            extension_ptrs.len(),
            layer_ptrs.len()
        );

        Ok(Self {
            debug,
            surface_loader,
            instance,
            entry,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }

    /// Raw instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Window surface, destroyed before the instance it was created from
pub struct VulkanSurface {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl VulkanSurface {
    /// Take ownership of a surface created for `instance`
    pub fn new(instance: &VulkanInstance, surface: vk::SurfaceKHR) -> Self {
        Self {
            loader: instance.surface_loader().clone(),
            surface,
        }
    }

    /// Surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Routes validation layer messages to `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VALIDATION_LAYER;

    #[test]
    fn test_validation_adds_debug_requirements() {
        let config = VulkanRendererConfig::new("test").with_validation(true);
        let requirements = instance_requirements(&config, &["VK_KHR_surface".to_string()]);

        assert_eq!(requirements.extensions.names()[0], "VK_KHR_surface");
        assert!(requirements
            .extensions
            .names()
            .iter()
            .any(|name| name == "VK_EXT_debug_utils"));
        assert_eq!(requirements.layers.names(), &[VALIDATION_LAYER]);
    }

    #[test]
    fn test_no_validation_only_window_extensions() {
        let config = VulkanRendererConfig::new("test").with_validation(false);
        let requirements = instance_requirements(&config, &["VK_KHR_surface".to_string()]);

        assert_eq!(requirements.extensions.names(), &["VK_KHR_surface"]);
        assert!(requirements.layers.is_empty());
    }
}
