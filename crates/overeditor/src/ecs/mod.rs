//! Entity-Component-System for the editor scene
//!
//! Entities are generational keys; each component type lives in its own
//! sparse storage. Systems are plain structs driven by the application loop.

pub mod component;
pub mod components;
pub mod entity;
pub mod systems;
pub mod world;

pub use component::Component;
pub use entity::Entity;
pub use world::World;
