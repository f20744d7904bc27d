//! ECS World implementation

use std::any::{Any, TypeId};
use std::collections::HashMap;

use slotmap::{SecondaryMap, SlotMap};

use super::{Component, Entity};

/// Type-erased per-component storage
trait ComponentStorage {
    fn remove_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ComponentStorage for SecondaryMap<Entity, T> {
    fn remove_entity(&mut self, entity: Entity) {
        self.remove(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// ECS World containing all entities and components
pub struct World {
    entities: SlotMap<Entity, ()>,
    component_storages: HashMap<TypeId, Box<dyn ComponentStorage>>,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            component_storages: HashMap::new(),
        }
    }

    /// Create a new entity
    pub fn create_entity(&mut self) -> Entity {
        self.entities.insert(())
    }

    /// Remove an entity and all of its components
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if self.entities.remove(entity).is_none() {
            return false;
        }
        for storage in self.component_storages.values_mut() {
            storage.remove_entity(entity);
        }
        true
    }

    /// Whether `entity` exists
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn storage<T: Component>(&self) -> Option<&SecondaryMap<Entity, T>> {
        self.component_storages
            .get(&TypeId::of::<T>())
            .and_then(|storage| storage.as_any().downcast_ref())
    }

    fn storage_mut<T: Component>(&mut self) -> Option<&mut SecondaryMap<Entity, T>> {
        self.component_storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|storage| storage.as_any_mut().downcast_mut())
    }

    /// Add a component to an entity, returning the one it replaces
    ///
    /// Components of dead entities are dropped.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Option<T> {
        if !self.is_alive(entity) {
            log::warn!("Ignoring {} for despawned entity", std::any::type_name::<T>());
            return None;
        }
        let storage = self
            .component_storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SecondaryMap::<Entity, T>::new()));
        storage
            .as_any_mut()
            .downcast_mut::<SecondaryMap<Entity, T>>()
            .and_then(|storage| storage.insert(entity, component))
    }

    /// Remove a component from an entity
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.storage_mut::<T>().and_then(|storage| storage.remove(entity))
    }

    /// Get a component from an entity
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>().and_then(|storage| storage.get(entity))
    }

    /// Get a mutable component from an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>().and_then(|storage| storage.get_mut(entity))
    }

    /// Every entity having an `A`
    pub fn query<A: Component>(&self) -> impl Iterator<Item = (Entity, &A)> + '_ {
        self.storage::<A>().into_iter().flat_map(|storage| storage.iter())
    }

    /// Every entity having both an `A` and a `B`
    pub fn query2<A: Component, B: Component>(&self) -> impl Iterator<Item = (Entity, &A, &B)> + '_ {
        let second = self.storage::<B>();
        self.query::<A>()
            .filter_map(move |(entity, a)| second.and_then(|storage| storage.get(entity)).map(|b| (entity, a, b)))
    }

    /// Get an iterator over all entities
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, PartialEq)]
    struct Name(&'static str);
    impl Component for Name {}

    #[test]
    fn test_add_and_get() {
        let mut world = World::new();
        let entity = world.create_entity();

        assert!(world.add_component(entity, Position(3)).is_none());
        assert_eq!(world.add_component(entity, Position(4)), Some(Position(3)));
        assert_eq!(world.get_component::<Position>(entity), Some(&Position(4)));
        assert!(world.get_component::<Name>(entity).is_none());

        if let Some(position) = world.get_component_mut::<Position>(entity) {
            position.0 = 9;
        }
        assert_eq!(world.remove_component::<Position>(entity), Some(Position(9)));
    }

    #[test]
    fn test_query2_requires_both() {
        let mut world = World::new();
        let both = world.create_entity();
        let only_position = world.create_entity();
        let only_name = world.create_entity();

        world.add_component(both, Position(1));
        world.add_component(both, Name("both"));
        world.add_component(only_position, Position(2));
        world.add_component(only_name, Name("name"));

        let found: Vec<_> = world.query2::<Position, Name>().map(|(entity, _, name)| (entity, name.0)).collect();
        assert_eq!(found, vec![(both, "both")]);
        assert_eq!(world.query::<Position>().count(), 2);
    }

    #[test]
    fn test_despawn_removes_components() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, Position(1));

        assert!(world.despawn(entity));
        assert!(!world.despawn(entity));
        assert!(!world.is_alive(entity));
        assert_eq!(world.query::<Position>().count(), 0);

        assert!(world.add_component(entity, Position(5)).is_none());
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_query_on_unknown_component_is_empty() {
        let world = World::new();
        assert_eq!(world.query2::<Position, Name>().count(), 0);
    }
}
