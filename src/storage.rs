//! Component storage router
//!
//! [`ComponentStorage`] owns every archetype and keeps track of which one each
//! entity lives in. Adding or removing a component moves the entity's row to
//! the archetype matching its new signature, creating that archetype on first
//! use. Transitions are cached per `(archetype, component, add/remove)`.

use ahash::AHashMap;
use rustc_hash::FxHashMap;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentTypeId};
use crate::config::WorldConfig;
use crate::entity::EntityId;
use crate::error::Result;
use crate::pool::{BufferPool, PoolStats, SharedBufferPool};
use crate::signature::ComponentSignature;

/// Index into the archetype list
pub type ArchetypeId = usize;

pub struct ComponentStorage {
    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<ComponentSignature, ArchetypeId>,
    /// Archetypes containing each component type
    by_component: AHashMap<ComponentTypeId, Vec<ArchetypeId>>,
    /// (source, component, added) -> destination
    transitions: FxHashMap<(ArchetypeId, ComponentTypeId, bool), ArchetypeId>,
    locations: AHashMap<EntityId, ArchetypeId>,
    pool: SharedBufferPool,
    initial_capacity: usize,
}

impl ComponentStorage {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            archetypes: Vec::new(),
            archetype_index: AHashMap::new(),
            by_component: AHashMap::new(),
            transitions: FxHashMap::default(),
            locations: AHashMap::new(),
            pool: BufferPool::shared(config.pool.clone()),
            initial_capacity: config.archetype_initial_capacity,
        }
    }

    /// Attach `value` to `entity`.
    ///
    /// Overwrites in place when the entity already has a `T` and returns the
    /// old value; otherwise migrates the entity to the grown archetype.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> Result<Option<T>> {
        let id = ComponentTypeId::of::<T>();
        match self.locations.get(&entity).copied() {
            Some(src) if self.archetypes[src].has_component(id) => {
                let previous = self.archetypes[src].set_component(entity, value)?;
                Ok(Some(previous))
            }
            Some(src) => {
                let dst = self.transition(src, id, true)?;
                let (from, to) = pair_mut(&mut self.archetypes, src, dst);
                from.migrate_to(entity, to)?;
                to.push_column_value(value);
                to.debug_check_lockstep();
                self.locations.insert(entity, dst);
                Ok(None)
            }
            None => {
                let dst = self.get_or_create_archetype(ComponentSignature::new().with(id))?;
                self.archetypes[dst].add_entity(entity, (value,))?;
                self.locations.insert(entity, dst);
                Ok(None)
            }
        }
    }

    /// Detach `T` from `entity` and hand it back.
    ///
    /// Removing the last component stops tracking the entity.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<Option<T>> {
        let id = ComponentTypeId::of::<T>();
        let Some(src) = self.locations.get(&entity).copied() else {
            return Ok(None);
        };
        if !self.archetypes[src].has_component(id) {
            return Ok(None);
        }

        if self.archetypes[src].signature().len() == 1 {
            let value = self.archetypes[src].take_and_migrate::<T>(entity, None)?;
            self.locations.remove(&entity);
            return Ok(Some(value));
        }

        let dst = self.transition(src, id, false)?;
        let (from, to) = pair_mut(&mut self.archetypes, src, dst);
        let value = from.take_and_migrate::<T>(entity, Some(to))?;
        to.debug_check_lockstep();
        self.locations.insert(entity, dst);
        Ok(Some(value))
    }

    /// Drop every component of `entity`. Returns false if it had none.
    pub fn remove_all_components(&mut self, entity: EntityId) -> Result<bool> {
        let Some(idx) = self.locations.get(&entity).copied() else {
            return Ok(false);
        };
        let row = self.archetypes[idx].detach_entity(entity)?;
        self.locations.remove(&entity);
        // Destructors run last so a panicking Drop leaves both indexes agreeing
        drop(row);
        Ok(true)
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let idx = *self.locations.get(&entity)?;
        self.archetypes[idx].get_component::<T>(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let idx = *self.locations.get(&entity)?;
        self.archetypes[idx].get_component_mut::<T>(entity)
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.has_component_id(entity, ComponentTypeId::of::<T>())
    }

    pub fn has_component_id(&self, entity: EntityId, id: ComponentTypeId) -> bool {
        self.locations
            .get(&entity)
            .is_some_and(|&idx| self.archetypes[idx].has_component(id))
    }

    /// Archetypes that store `id`
    pub fn archetypes_with(
        &self,
        id: ComponentTypeId,
    ) -> impl Iterator<Item = &Archetype> + Clone + '_ {
        self.by_component
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&idx| &self.archetypes[idx])
    }

    /// Every entity carrying a `T`, scanning only archetypes that store it
    pub fn entities_with_component<T: Component>(
        &self,
    ) -> impl Iterator<Item = EntityId> + Clone + '_ {
        self.archetypes_with(ComponentTypeId::of::<T>())
            .flat_map(|archetype| archetype.entities().iter().copied())
    }

    /// Every `(entity, &T)` pair
    pub fn all_components<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + Clone + '_ {
        self.archetypes_with(ComponentTypeId::of::<T>())
            .flat_map(|archetype| archetype.iter_components::<T>())
    }

    pub fn iter2<A: Component, B: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B)> + Clone + '_ {
        let b = ComponentTypeId::of::<B>();
        self.archetypes_with(ComponentTypeId::of::<A>())
            .filter(move |archetype| archetype.has_component(b))
            .flat_map(|archetype| archetype.iter_components2::<A, B>())
    }

    pub fn iter3<A: Component, B: Component, C: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B, &C)> + Clone + '_ {
        let b = ComponentTypeId::of::<B>();
        let c = ComponentTypeId::of::<C>();
        self.archetypes_with(ComponentTypeId::of::<A>())
            .filter(move |archetype| archetype.has_component(b) && archetype.has_component(c))
            .flat_map(|archetype| archetype.iter_components3::<A, B, C>())
    }

    /// Archetypes holding all of `required` and none of `excluded`
    pub fn matching_archetypes<'a>(
        &'a self,
        required: &'a ComponentSignature,
        excluded: &'a ComponentSignature,
    ) -> impl Iterator<Item = &'a Archetype> + Clone + 'a {
        self.archetypes.iter().filter(move |archetype| {
            archetype.signature().is_superset(required)
                && !archetype.signature().intersects(excluded)
        })
    }

    /// Mutate every `T` in place
    pub fn for_each_mut<T: Component, F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, &mut T),
    {
        let Some(ids) = self.by_component.get(&ComponentTypeId::of::<T>()) else {
            return;
        };
        for &idx in ids {
            if let Some((entities, column)) = self.archetypes[idx].columns_mut::<T>() {
                for (&entity, value) in entities.iter().zip(column.iter_mut()) {
                    f(entity, value);
                }
            }
        }
    }

    /// Mutate every `(A, B)` pair in place
    pub fn for_each_mut2<A: Component, B: Component, F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, &mut A, &mut B),
    {
        let Some(ids) = self.by_component.get(&ComponentTypeId::of::<A>()) else {
            return;
        };
        for &idx in ids {
            if let Some((entities, a, b)) = self.archetypes[idx].columns_mut2::<A, B>() {
                for ((&entity, a), b) in entities.iter().zip(a.iter_mut()).zip(b.iter_mut()) {
                    f(entity, a, b);
                }
            }
        }
    }

    /// Component types attached to `entity`; `None` when it has none
    pub fn signature_of(&self, entity: EntityId) -> Option<&ComponentSignature> {
        let idx = *self.locations.get(&entity)?;
        Some(self.archetypes[idx].signature())
    }

    pub fn archetype_of(&self, entity: EntityId) -> Option<ArchetypeId> {
        self.locations.get(&entity).copied()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Archetype with exactly this signature, if one was created
    pub fn archetype_for(&self, signature: &ComponentSignature) -> Option<ArchetypeId> {
        self.archetype_index.get(signature).copied()
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Entities with at least one component
    pub fn tracked_entity_count(&self) -> usize {
        self.locations.len()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.lock().stats()
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    /// Drop every archetype and all component data
    pub fn clear(&mut self) {
        self.locations.clear();
        self.transitions.clear();
        self.by_component.clear();
        self.archetype_index.clear();
        self.archetypes.clear();
        self.pool.lock().clear();
    }

    fn transition(&mut self, src: ArchetypeId, id: ComponentTypeId, add: bool) -> Result<ArchetypeId> {
        if let Some(&dst) = self.transitions.get(&(src, id, add)) {
            return Ok(dst);
        }

        let signature = if add {
            self.archetypes[src].signature().with(id)
        } else {
            self.archetypes[src].signature().without(id)
        };
        let dst = self.get_or_create_archetype(signature)?;
        self.transitions.insert((src, id, add), dst);
        Ok(dst)
    }

    fn get_or_create_archetype(&mut self, signature: ComponentSignature) -> Result<ArchetypeId> {
        if let Some(&idx) = self.archetype_index.get(&signature) {
            return Ok(idx);
        }

        let archetype =
            Archetype::with_pool(signature.clone(), self.initial_capacity, self.pool.clone())?;
        let idx = self.archetypes.len();
        for component in signature.iter() {
            self.by_component.entry(component).or_default().push(idx);
        }
        tracing::debug!(
            archetype = idx,
            components = signature.len(),
            signature = ?signature,
            "created archetype"
        );
        self.archetypes.push(archetype);
        self.archetype_index.insert(signature, idx);
        Ok(idx)
    }
}

impl Default for ComponentStorage {
    fn default() -> Self {
        Self::new(&WorldConfig::default())
    }
}

fn pair_mut(archetypes: &mut [Archetype], a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b, "migration within a single archetype");
    if a < b {
        let (left, right) = archetypes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentSet;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32, f32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32, f32);

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(&'static str);

    fn id(raw: u64) -> EntityId {
        EntityId::from_raw(raw)
    }

    fn assert_invariants(storage: &ComponentStorage) {
        for archetype in storage.archetypes() {
            for column in archetype.columns() {
                assert_eq!(column.len(), archetype.len());
            }
            for (row, &entity) in archetype.entities().iter().enumerate() {
                assert_eq!(archetype.row_of(entity), Some(row));
                let located = storage.archetype_of(entity).unwrap();
                assert_eq!(storage.archetype(located).unwrap().signature(), archetype.signature());
            }
        }
    }

    #[test]
    fn test_add_migrates_and_keeps_values() {
        let mut storage = ComponentStorage::default();
        storage.add_component(id(1), Position(1.0, 2.0)).unwrap();
        storage.add_component(id(1), Velocity(3.0, 4.0)).unwrap();

        assert_eq!(storage.archetype_count(), 2);
        assert_eq!(storage.get_component::<Position>(id(1)), Some(&Position(1.0, 2.0)));
        assert_eq!(storage.get_component::<Velocity>(id(1)), Some(&Velocity(3.0, 4.0)));
        assert_eq!(
            storage.signature_of(id(1)),
            Some(&<(Position, Velocity)>::signature())
        );
        // The single-component archetype is left empty, not destroyed
        assert!(storage.archetypes()[0].is_empty());
        assert_invariants(&storage);
    }

    #[test]
    fn test_overwrite_does_not_migrate() {
        let mut storage = ComponentStorage::default();
        storage.add_component(id(1), Position(0.0, 0.0)).unwrap();
        let before = storage.archetype_of(id(1));

        let previous = storage.add_component(id(1), Position(5.0, 5.0)).unwrap();

        assert_eq!(previous, Some(Position(0.0, 0.0)));
        assert_eq!(storage.archetype_of(id(1)), before);
        assert_eq!(storage.get_component::<Position>(id(1)), Some(&Position(5.0, 5.0)));
    }

    #[test]
    fn test_remove_last_component_untracks() {
        let mut storage = ComponentStorage::default();
        storage.add_component(id(1), Tag("a")).unwrap();

        assert_eq!(storage.remove_component::<Tag>(id(1)).unwrap(), Some(Tag("a")));
        assert_eq!(storage.tracked_entity_count(), 0);
        assert_eq!(storage.signature_of(id(1)), None);
        assert_eq!(storage.remove_component::<Tag>(id(1)).unwrap(), None);
    }

    #[test]
    fn test_remove_moves_to_shrunk_archetype() {
        let mut storage = ComponentStorage::default();
        storage.add_component(id(1), Position(1.0, 1.0)).unwrap();
        storage.add_component(id(1), Velocity(2.0, 2.0)).unwrap();
        storage.add_component(id(2), Position(3.0, 3.0)).unwrap();

        let removed = storage.remove_component::<Velocity>(id(1)).unwrap();

        assert_eq!(removed, Some(Velocity(2.0, 2.0)));
        assert_eq!(storage.archetype_of(id(1)), storage.archetype_of(id(2)));
        assert!(!storage.has_component::<Velocity>(id(1)));
        assert_eq!(storage.get_component::<Position>(id(1)), Some(&Position(1.0, 1.0)));
        assert_invariants(&storage);
    }

    #[test]
    fn test_transitions_reuse_archetypes() {
        let mut storage = ComponentStorage::default();
        for raw in 1..=10 {
            storage.add_component(id(raw), Position(0.0, 0.0)).unwrap();
            storage.add_component(id(raw), Velocity(0.0, 0.0)).unwrap();
            storage.remove_component::<Position>(id(raw)).unwrap();
        }
        assert_eq!(storage.archetype_count(), 3);
        assert_eq!(storage.entities_with_component::<Velocity>().count(), 10);
        assert_eq!(storage.entities_with_component::<Position>().count(), 0);
    }

    #[test]
    fn test_iteration_and_in_place_mutation() {
        let mut storage = ComponentStorage::default();
        for raw in 1..=3 {
            storage.add_component(id(raw), Position(raw as f32, 0.0)).unwrap();
            storage.add_component(id(raw), Velocity(1.0, 1.0)).unwrap();
        }
        storage.add_component(id(4), Position(100.0, 0.0)).unwrap();

        storage.for_each_mut2::<Position, Velocity, _>(|_, p, v| {
            p.0 += v.0;
            p.1 += v.1;
        });

        let moved: Vec<f32> = storage.iter2::<Position, Velocity>().map(|(_, p, _)| p.0).collect();
        assert_eq!(moved, vec![2.0, 3.0, 4.0]);
        assert_eq!(storage.get_component::<Position>(id(4)), Some(&Position(100.0, 0.0)));

        storage.for_each_mut::<Position, _>(|_, p| p.1 = -1.0);
        assert!(storage.all_components::<Position>().all(|(_, p)| p.1 == -1.0));
    }

    #[test]
    fn test_matching_archetypes() {
        let mut storage = ComponentStorage::default();
        storage.add_component(id(1), Position(0.0, 0.0)).unwrap();
        storage.add_component(id(2), Position(0.0, 0.0)).unwrap();
        storage.add_component(id(2), Tag("t")).unwrap();

        let required = ComponentSignature::of::<Position>();
        let excluded = ComponentSignature::of::<Tag>();
        let matched: Vec<EntityId> = storage
            .matching_archetypes(&required, &excluded)
            .flat_map(|a| a.entities().iter().copied())
            .collect();
        assert_eq!(matched, vec![id(1)]);
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let mut storage = ComponentStorage::default();
        for step in 0..200u64 {
            let entity = id(step % 17 + 1);
            match step % 5 {
                0 => {
                    let _ = storage.add_component(entity, Position(step as f32, 0.0));
                }
                1 => {
                    let _ = storage.add_component(entity, Velocity(0.0, step as f32));
                }
                2 => {
                    let _ = storage.remove_component::<Position>(entity);
                }
                3 => {
                    let _ = storage.add_component(entity, Tag("x"));
                }
                _ => {
                    let _ = storage.remove_all_components(entity);
                }
            }
            assert_invariants(&storage);
        }
    }
}
