//! Component trait and implementations

/// Marker trait for components
pub trait Component: 'static + Send + Sync {}

impl Component for crate::ecs::components::TransformComponent {}
impl Component for crate::ecs::components::Camera {}
impl Component for crate::ecs::components::Drawable {}
