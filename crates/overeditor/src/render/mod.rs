//! # Rendering
//!
//! Windowing and the Vulkan backend. The scene-facing side (cameras,
//! drawables, the per-frame scheduler) lives in [`crate::ecs`].

pub mod vulkan;
pub mod window;

pub use window::{Window, WindowError, WindowResult};
