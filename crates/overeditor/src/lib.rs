//! # OverEditor
//!
//! Core of a small real-time 3D scene editor on Vulkan.
//!
//! - **Rendering**: device election, swapchain, shaders with declared memory
//!   layouts, per-shader descriptor allocation and cached draw commands
//! - **ECS**: slotmap-keyed entities carrying transforms, cameras and drawables
//! - **Configuration**: serde-backed TOML/RON settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overeditor::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let config = ApplicationConfig::load_or_default("overeditor.toml")?;
//!     let mut app = Application::new(&config)?;
//!     app.run()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod ecs;
pub mod events;
pub mod foundation;
pub mod render;

mod application;

pub use application::{AppError, AppResult, Application, FIXED_DELTA};

/// Common imports for editor users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, ShaderConfig, VulkanRendererConfig, WindowConfig},
        ecs::{
            components::{Camera, CameraMatrices, Drawable, TransformComponent},
            Component, Entity, World,
        },
        events::{Event, ListenerId, StepFunction},
        foundation::math::{Mat4, Quat, Vec3},
        render::vulkan::{
            DescriptorElement, DescriptorLayout, GeometryBuffer, PushConstantElement, PushConstantsLayout, Shader,
            ShaderSource, VertexElement, VertexLayout, VulkanError, VulkanResult,
        },
        AppError, AppResult, Application,
    };
}
