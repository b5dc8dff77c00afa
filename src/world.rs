// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: entity table, component storage and lifecycle events

use std::any::type_name;
use std::collections::BTreeMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{Bundle, Component, ComponentSet, ComponentTypeId};
use crate::config::WorldConfig;
use crate::entity::{Entity, EntityAllocator, EntityId};
use crate::error::{EcsError, Result};
use crate::event_bus::EventBus;
use crate::event_types::{ComponentAdded, ComponentRemoved, EntityCreated, EntityDestroyed};
use crate::signature::ComponentSignature;
use crate::storage::ComponentStorage;

const DISPOSED: &str = "world has been disposed";

/// Central ECS world
///
/// Owns every entity record and all component data. Each structural change
/// (entity created or destroyed, component added or removed) publishes one
/// event on [`World::events_mut`].
pub struct World {
    /// Entity records, ordered by id
    entities: BTreeMap<EntityId, Entity>,
    storage: ComponentStorage,
    allocator: EntityAllocator,
    events: EventBus,
    config: WorldConfig,
    disposed: bool,
}

impl World {
    /// Create a world with default settings
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Create a world from a validated config
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            entities: BTreeMap::new(),
            storage: ComponentStorage::new(&config),
            allocator: EntityAllocator::new(),
            events: EventBus::new(),
            config,
            disposed: false,
        }
    }

    /// Create an entity with no components
    pub fn create_entity(&mut self, name: impl Into<String>) -> Result<EntityId> {
        self.check_alive()?;
        let id = self.allocator.allocate()?;
        let entity = Entity::new(id, name);

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.create_entity", entity = %id).entered();

        let name = entity.name.clone();
        self.entities.insert(id, entity);
        self.events.publish(&EntityCreated { entity: id, name });
        Ok(id)
    }

    /// Create an entity and attach every component of `bundle`, one at a time
    pub fn create_entity_with<B: Bundle>(
        &mut self,
        name: impl Into<String>,
        bundle: B,
    ) -> Result<EntityId> {
        let id = self.create_entity(name)?;
        bundle.insert_into(self, id)?;
        Ok(id)
    }

    /// Destroy an entity and all its components.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<bool> {
        self.check_alive()?;
        if !self.entities.contains_key(&id) {
            return Ok(false);
        }

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.destroy_entity", entity = %id).entered();

        let Some(entity) = self.entities.remove(&id) else {
            return Ok(false);
        };
        self.storage.remove_all_components(id)?;
        tracing::debug!(entity = %id, name = %entity.name, "destroyed entity");
        self.events.publish(&EntityDestroyed {
            entity: id,
            name: entity.name,
        });
        Ok(true)
    }

    /// Attach a component, replacing any existing value of the same type
    pub fn add_component<T: Component>(&mut self, id: EntityId, component: T) -> Result<()> {
        self.check_alive()?;
        self.check_entity(id)?;

        #[cfg(feature = "profiling")]
        let _span = info_span!("world.add_component", entity = %id, component = type_name::<T>())
            .entered();

        self.storage.add_component(id, component)?;
        self.events.publish(&ComponentAdded {
            entity: id,
            component: ComponentTypeId::of::<T>(),
            type_name: type_name::<T>(),
        });
        Ok(())
    }

    /// Attach `T::default()`
    pub fn add_default_component<T: Component + Default>(&mut self, id: EntityId) -> Result<()> {
        self.add_component(id, T::default())
    }

    /// Detach a component and return it; `None` if the entity did not have one
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<Option<T>> {
        self.check_alive()?;
        self.check_entity(id)?;

        #[cfg(feature = "profiling")]
        let _span =
            info_span!("world.remove_component", entity = %id, component = type_name::<T>())
                .entered();

        let removed = self.storage.remove_component::<T>(id)?;
        if removed.is_some() {
            self.events.publish(&ComponentRemoved {
                entity: id,
                component: ComponentTypeId::of::<T>(),
                type_name: type_name::<T>(),
            });
        }
        Ok(removed)
    }

    /// Get component reference
    pub fn get_component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.assert_alive();
        self.storage.get_component::<T>(id)
    }

    /// Get mutable component reference
    pub fn get_component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.assert_alive();
        self.storage.get_component_mut::<T>(id)
    }

    /// Check if entity has component
    pub fn has_component<T: Component>(&self, id: EntityId) -> bool {
        self.assert_alive();
        self.storage.has_component::<T>(id)
    }

    /// Like [`World::get_component`], but reports why nothing was found
    pub fn try_get_component<T: Component>(&self, id: EntityId) -> Result<&T> {
        self.check_alive()?;
        self.check_entity(id)?;
        self.storage
            .get_component::<T>(id)
            .ok_or(EcsError::ComponentNotFound {
                entity: id,
                component: type_name::<T>(),
            })
    }

    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.assert_alive();
        self.entities.get(&id)
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.assert_alive();
        self.entities.contains_key(&id)
    }

    /// Every entity id in ascending order, including component-less entities
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + Clone + '_ {
        self.assert_alive();
        self.entities.keys().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.assert_alive();
        self.entities.len()
    }

    /// Component types attached to `id`; empty for a component-less entity
    pub fn component_signature(&self, id: EntityId) -> Option<ComponentSignature> {
        self.assert_alive();
        if !self.entities.contains_key(&id) {
            return None;
        }
        Some(self.storage.signature_of(id).cloned().unwrap_or_default())
    }

    /// Entities carrying every component of `Q`, e.g. `world.query::<(Transform, Camera)>()`
    pub fn query<Q: ComponentSet>(&self) -> impl Iterator<Item = EntityId> + Clone + '_ {
        self.assert_alive();
        let required = Q::signature();
        self.storage
            .archetypes()
            .iter()
            .filter(move |archetype| archetype.signature().is_superset(&required))
            .flat_map(|archetype| archetype.entities().iter().copied())
    }

    /// Iterate `(entity, &T)`
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + Clone + '_ {
        self.assert_alive();
        self.storage.all_components::<T>()
    }

    pub fn iter2<A: Component, B: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B)> + Clone + '_ {
        self.assert_alive();
        self.storage.iter2::<A, B>()
    }

    pub fn iter3<A: Component, B: Component, C: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B, &C)> + Clone + '_ {
        self.assert_alive();
        self.storage.iter3::<A, B, C>()
    }

    /// Mutate every `T` in place
    pub fn for_each_mut<T: Component, F>(&mut self, f: F)
    where
        F: FnMut(EntityId, &mut T),
    {
        self.assert_alive();
        self.storage.for_each_mut::<T, F>(f);
    }

    /// Mutate every `(A, B)` pair in place
    pub fn for_each_mut2<A: Component, B: Component, F>(&mut self, f: F)
    where
        F: FnMut(EntityId, &mut A, &mut B),
    {
        self.assert_alive();
        self.storage.for_each_mut2::<A, B, F>(f);
    }

    /// Destroy every entity, publishing one `EntityDestroyed` each
    pub fn clear(&mut self) -> Result<()> {
        self.check_alive()?;
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.destroy_entity(id)?;
        }
        Ok(())
    }

    /// Clear the world and release its storage. Further use fails.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Err(err) = self.clear() {
            tracing::warn!(error = %err, "failed to clear world during dispose");
        }
        self.entities.clear();
        self.storage.clear();
        self.events.clear_subscribers();
        self.disposed = true;
        tracing::debug!("world disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Archetype-level view of the component data
    pub fn storage(&self) -> &ComponentStorage {
        &self.storage
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    fn check_alive(&self) -> Result<()> {
        if self.disposed {
            Err(EcsError::WorldDisposed)
        } else {
            Ok(())
        }
    }

    fn assert_alive(&self) {
        assert!(!self.disposed, "{DISPOSED}");
    }

    fn check_entity(&self, id: EntityId) -> Result<()> {
        if self.entities.contains_key(&id) {
            Ok(())
        } else {
            Err(EcsError::EntityNotFound(id))
        }
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
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Health(u32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Speed(f32);

    #[test]
    fn test_ids_start_at_one_and_are_not_reused() {
        let mut world = World::new();
        let a = world.create_entity("a").unwrap();
        let b = world.create_entity("b").unwrap();
        assert_eq!(a.to_raw(), 1);
        assert_eq!(b.to_raw(), 2);

        assert!(world.destroy_entity(a).unwrap());
        assert!(!world.destroy_entity(a).unwrap());
        let c = world.create_entity("c").unwrap();
        assert_eq!(c.to_raw(), 3);
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn test_zero_component_entity_survives() {
        let mut world = World::new();
        let e = world.create_entity("bare").unwrap();
        world.add_component(e, Health(3)).unwrap();
        assert_eq!(world.remove_component::<Health>(e).unwrap(), Some(Health(3)));

        assert!(world.contains_entity(e));
        assert_eq!(world.component_signature(e), Some(ComponentSignature::new()));
        assert_eq!(world.get_entity(e).unwrap().name, "bare");
        assert_eq!(world.storage().tracked_entity_count(), 0);
    }

    #[test]
    fn test_unknown_entity_errors() {
        let mut world = World::new();
        let ghost = EntityId::from_raw(42);
        assert_eq!(
            world.add_component(ghost, Health(1)),
            Err(EcsError::EntityNotFound(ghost))
        );
        assert_eq!(
            world.remove_component::<Health>(ghost),
            Err(EcsError::EntityNotFound(ghost))
        );
        assert!(world.get_component::<Health>(ghost).is_none());
        assert_eq!(world.component_signature(ghost), None);
    }

    #[test]
    fn test_add_default_and_try_get() {
        let mut world = World::new();
        let e = world.create_entity("e").unwrap();
        world.add_default_component::<Health>(e).unwrap();
        assert_eq!(world.try_get_component::<Health>(e), Ok(&Health(0)));
        assert!(matches!(
            world.try_get_component::<Speed>(e),
            Err(EcsError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_overwrite_publishes_added_again() {
        let mut world = World::new();
        let added = Arc::new(Mutex::new(0));
        let counter = added.clone();
        world.events_mut().subscribe::<ComponentAdded, _>(move |_| {
            *counter.lock() += 1;
            Ok(())
        });

        let e = world.create_entity("e").unwrap();
        world.add_component(e, Speed(1.0)).unwrap();
        world.add_component(e, Speed(2.0)).unwrap();

        assert_eq!(*added.lock(), 2);
        assert_eq!(world.get_component::<Speed>(e), Some(&Speed(2.0)));
    }

    #[test]
    fn test_clear_destroys_everything() {
        let mut world = World::new();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let log = destroyed.clone();
        world.events_mut().subscribe::<EntityDestroyed, _>(move |event| {
            log.lock().push(event.entity);
            Ok(())
        });

        let a = world.create_entity_with("a", (Health(1),)).unwrap();
        let b = world.create_entity("b").unwrap();
        world.clear().unwrap();

        assert_eq!(world.entity_count(), 0);
        assert_eq!(*destroyed.lock(), vec![a, b]);
        assert_eq!(world.iter::<Health>().count(), 0);
    }

    #[test]
    fn test_disposed_world_fails_fast() {
        let mut world = World::new();
        let e = world.create_entity("e").unwrap();
        world.dispose();

        assert!(world.is_disposed());
        assert_eq!(world.create_entity("late"), Err(EcsError::WorldDisposed));
        assert_eq!(world.add_component(e, Health(1)), Err(EcsError::WorldDisposed));
        assert_eq!(world.destroy_entity(e), Err(EcsError::WorldDisposed));
        assert_eq!(world.clear(), Err(EcsError::WorldDisposed));
        world.dispose();
    }

    #[test]
    #[should_panic(expected = "world has been disposed")]
    fn test_disposed_world_panics_on_access() {
        let mut world = World::new();
        world.dispose();
        let _ = world.has_component::<Health>(EntityId::from_raw(1));
    }

    #[test]
    #[should_panic(expected = "world has been disposed")]
    fn test_disposed_world_panics_on_entity_count() {
        let mut world = World::new();
        world.create_entity("e").unwrap();
        world.dispose();
        let _ = world.entity_count();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = WorldConfig {
            archetype_initial_capacity: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(
            World::with_config(config),
            Err(EcsError::InvalidConfig(_))
        ));
    }
}
