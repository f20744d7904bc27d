//! # Core Module
//!
//! Shared configuration used by every subsystem.

pub mod config;

pub use config::{
    ApplicationConfig, Config, ConfigError, DeviceScoringConfig, EngineConfig, ShaderConfig,
    VulkanRendererConfig, WindowConfig,
};
