//! # Editor Configuration
//!
//! All tunables of the editor in one serializable tree:
//!
//! - **Engine**: logging
//! - **Window**: title and size (the size is also the preferred swapchain extent)
//! - **Renderer**: instance metadata, validation, shaders, device requirements,
//!   device scoring and draw-cache behavior

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// Name of the validation layer enabled when validation is on
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Name of the swapchain device extension
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// # Shader Configuration
///
/// Paths of the SPIR-V files used by the default scene shader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("shaders/vert.spv", "shaders/frag.spv")
    }
}

/// Weights used to rank physical devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceScoringConfig {
    /// Added once when the device is a discrete GPU
    pub discrete_gpu_bonus: u32,
    /// Points per GiB of device-local memory
    pub memory_score_multiplier: u32,
}

impl Default for DeviceScoringConfig {
    fn default() -> Self {
        Self {
            discrete_gpu_bonus: 1500,
            memory_score_multiplier: 100,
        }
    }
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Width in screen coordinates, also the preferred swapchain width
    pub width: u32,
    /// Height in screen coordinates, also the preferred swapchain height
    pub height: u32,
}

impl WindowConfig {
    /// Validate the window settings
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("Window size must be non-zero, got {}x{}", self.width, self.height));
        }
        Ok(())
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "OverEditor".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Instance metadata, validation, device requirements and draw caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Layers requested when validation is enabled
    pub validation_layers: Vec<String>,
    /// Extensions every candidate device must support
    pub device_extensions: Vec<String>,
    /// Layers every candidate device must support
    pub device_layers: Vec<String>,
    /// Device ranking weights
    pub scoring: DeviceScoringConfig,
    /// Re-record cached draw commands when drawables or their transforms change
    pub invalidate_on_scene_change: bool,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (0, 1, 0),
            shaders: ShaderConfig::default(),
            enable_validation: None,
            validation_layers: vec![VALIDATION_LAYER.to_string()],
            device_extensions: vec![SWAPCHAIN_EXTENSION.to_string()],
            device_layers: Vec::new(),
            scoring: DeviceScoringConfig::default(),
            invalidate_on_scene_change: true,
        }
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Toggle draw-cache invalidation
    pub fn with_scene_invalidation(mut self, enabled: bool) -> Self {
        self.invalidate_on_scene_change = enabled;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if !self.device_extensions.iter().any(|ext| ext == SWAPCHAIN_EXTENSION) {
            return Err(format!("Device extensions must include {}", SWAPCHAIN_EXTENSION));
        }
        self.shaders.validate()
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("OverEditor")
    }
}

/// # Engine Configuration
///
/// Process-wide behavior: logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            engine: EngineConfig::default(),
            window: WindowConfig {
                title: app_name.clone(),
                ..WindowConfig::default()
            },
            renderer: VulkanRendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate().map_err(ConfigError::Invalid)?;
        self.renderer.validate().map_err(ConfigError::Invalid)
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("OverEditor")
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApplicationConfig::default();

        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 1080);
        assert_eq!(config.renderer.scoring.discrete_gpu_bonus, 1500);
        assert_eq!(config.renderer.scoring.memory_score_multiplier, 100);
        assert_eq!(config.renderer.device_extensions, vec![SWAPCHAIN_EXTENSION]);
        assert!(config.renderer.invalidate_on_scene_change);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ApplicationConfig::new("Scene")
            .renderer
            .with_validation(false)
            .with_scene_invalidation(false);
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: VulkanRendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = ApplicationConfig::new("Scene");
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let parsed: ApplicationConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: ApplicationConfig = toml::from_str(
            r#"
            [renderer]
            invalidate_on_scene_change = false
            "#,
        )
        .unwrap();

        assert!(!parsed.renderer.invalidate_on_scene_change);
        assert_eq!(parsed.renderer.scoring, DeviceScoringConfig::default());
        assert_eq!(parsed.window, WindowConfig::default());
    }

    #[test]
    fn test_validation_rejects_missing_swapchain_extension() {
        let mut config = VulkanRendererConfig::default();
        config.device_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_validation() {
        let window = WindowConfig {
            width: 0,
            ..WindowConfig::default()
        };
        assert!(window.validate().is_err());
        assert!(WindowConfig::default().validate().is_ok());
    }
}
