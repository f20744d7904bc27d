//! ECS components for the editor scene

pub mod camera;
pub mod drawable;
pub mod transform;

pub use camera::{Camera, CameraMatrices};
pub use drawable::{DrawSignature, Drawable, DrawingInstructions};
pub use transform::TransformComponent;
