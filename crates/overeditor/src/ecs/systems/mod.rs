//! ECS systems

pub mod rendering_system;

pub use rendering_system::RenderingSystem;
