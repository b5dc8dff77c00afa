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

//! Declarative entity queries
//!
//! An [`EntityQuery`] is built independently of any world and evaluated
//! against one on demand:
//!
//! ```ignore
//! let moving = EntityQuery::new()
//!     .with::<Position>()
//!     .without::<Frozen>()
//!     .filter::<Velocity, _>(|v| v.x != 0.0);
//! for entity in moving.execute(&world) { /* ... */ }
//! ```
//!
//! A cached result is a snapshot. The world never invalidates it; changing
//! the query or calling [`EntityQuery::invalidate`] does.

use std::fmt;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::signature::ComponentSignature;
use crate::world::World;

type Predicate = Box<dyn Fn(&World, EntityId) -> bool + Send + Sync>;

/// With / Without / Where query builder
#[derive(Default)]
pub struct EntityQuery {
    required: ComponentSignature,
    excluded: ComponentSignature,
    predicates: Vec<Predicate>,
    cache: Option<Vec<EntityId>>,
}

impl EntityQuery {
    /// Query matching every entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`
    #[must_use]
    pub fn with<T: Component>(mut self) -> Self {
        self.required.insert(ComponentTypeId::of::<T>());
        self.cache = None;
        self
    }

    /// Exclude entities carrying `T`
    #[must_use]
    pub fn without<T: Component>(mut self) -> Self {
        self.excluded.insert(ComponentTypeId::of::<T>());
        self.cache = None;
        self
    }

    /// Keep entities whose `T` satisfies `predicate`; entities without `T` never match
    #[must_use]
    pub fn filter<T, F>(mut self, predicate: F) -> Self
    where
        T: Component,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(move |world, entity| {
            world
                .get_component::<T>(entity)
                .is_some_and(|value| predicate(value))
        }));
        self.cache = None;
        self
    }

    pub fn required(&self) -> &ComponentSignature {
        &self.required
    }

    pub fn excluded(&self) -> &ComponentSignature {
        &self.excluded
    }

    /// Evaluate lazily, or replay the cached snapshot if there is one
    pub fn execute<'a>(&'a self, world: &'a World) -> impl Iterator<Item = EntityId> + 'a {
        if let Some(cached) = &self.cache {
            return Box::new(cached.iter().copied()) as Box<dyn Iterator<Item = EntityId> + 'a>;
        }

        // Component-less entities live in no archetype, so walk the entity table
        let candidates: Box<dyn Iterator<Item = EntityId> + 'a> = if self.required.is_empty() {
            Box::new(
                world
                    .entities()
                    .filter(move |&entity| self.matches_signature(world, entity)),
            )
        } else {
            Box::new(
                world
                    .storage()
                    .matching_archetypes(&self.required, &self.excluded)
                    .flat_map(|archetype| archetype.entities().iter().copied()),
            )
        };

        if self.predicates.is_empty() {
            candidates
        } else {
            Box::new(candidates.filter(move |&entity| self.passes_predicates(world, entity)))
        }
    }

    /// Materialise the result once and keep it until the query changes
    pub fn cache(&mut self, world: &World) -> &[EntityId] {
        if self.cache.is_none() {
            #[cfg(feature = "profiling")]
            let _span = info_span!("query.cache").entered();

            let entities: Vec<EntityId> = self.execute(world).collect();
            self.cache = Some(entities);
        }
        self.cache.as_deref().unwrap_or(&[])
    }

    /// Drop the cached snapshot
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// True if `entity` currently satisfies every clause
    pub fn matches(&self, world: &World, entity: EntityId) -> bool {
        world.contains_entity(entity)
            && self.matches_signature(world, entity)
            && self.passes_predicates(world, entity)
    }

    pub fn first(&self, world: &World) -> Option<EntityId> {
        self.execute(world).next()
    }

    /// The only matching entity
    pub fn single(&self, world: &World) -> Result<EntityId> {
        let mut matches = self.execute(world);
        let first = matches.next().ok_or(EcsError::NoMatchingEntity)?;
        match matches.count() {
            0 => Ok(first),
            rest => Err(EcsError::MultipleMatchingEntities(rest + 1)),
        }
    }

    pub fn count(&self, world: &World) -> usize {
        self.execute(world).count()
    }

    pub fn any(&self, world: &World) -> bool {
        self.first(world).is_some()
    }

    pub fn to_vec(&self, world: &World) -> Vec<EntityId> {
        self.execute(world).collect()
    }

    fn matches_signature(&self, world: &World, entity: EntityId) -> bool {
        match world.storage().signature_of(entity) {
            Some(signature) => {
                signature.is_superset(&self.required) && !signature.intersects(&self.excluded)
            }
            None => self.required.is_empty(),
        }
    }

    fn passes_predicates(&self, world: &World, entity: EntityId) -> bool {
        self.predicates.iter().all(|predicate| predicate(world, entity))
    }
}

impl fmt::Debug for EntityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityQuery")
            .field("required", &self.required)
            .field("excluded", &self.excluded)
            .field("predicates", &self.predicates.len())
            .field("cached", &self.cache.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    struct Frozen;

    fn setup() -> (World, Vec<EntityId>) {
        let mut world = World::new();
        let a = world
            .create_entity_with("a", (Position { x: 1.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }))
            .unwrap();
        let b = world
            .create_entity_with("b", (Position { x: 5.0, y: 0.0 }, Velocity { x: 0.0, y: 0.0 }))
            .unwrap();
        let c = world
            .create_entity_with("c", (Position { x: 9.0, y: 0.0 }, Frozen))
            .unwrap();
        let d = world.create_entity("d").unwrap();
        (world, vec![a, b, c, d])
    }

    #[test]
    fn test_unconstrained_query_returns_all_entities() {
        let (world, ids) = setup();
        let mut all = EntityQuery::new().to_vec(&world);
        all.sort();
        assert_eq!(all, ids);
    }

    #[test]
    fn test_with_and_without() {
        let (world, ids) = setup();

        let mut with_pos = EntityQuery::new().with::<Position>().to_vec(&world);
        with_pos.sort();
        assert_eq!(with_pos, vec![ids[0], ids[1], ids[2]]);

        let mut moving = EntityQuery::new()
            .with::<Position>()
            .with::<Velocity>()
            .to_vec(&world);
        moving.sort();
        assert_eq!(moving, vec![ids[0], ids[1]]);

        let mut not_frozen = EntityQuery::new().without::<Frozen>().to_vec(&world);
        not_frozen.sort();
        assert_eq!(not_frozen, vec![ids[0], ids[1], ids[3]]);
    }

    #[test]
    fn test_filter_predicate() {
        let (world, ids) = setup();
        let fast = EntityQuery::new()
            .with::<Position>()
            .filter::<Velocity, _>(|v| v.x > 0.5);

        assert_eq!(fast.single(&world), Ok(ids[0]));
        assert!(fast.matches(&world, ids[0]));
        assert!(!fast.matches(&world, ids[2]));
    }

    #[test]
    fn test_terminals() {
        let (world, _) = setup();
        let none = EntityQuery::new().with::<Frozen>().with::<Velocity>();
        assert_eq!(none.single(&world), Err(EcsError::NoMatchingEntity));
        assert!(!none.any(&world));
        assert_eq!(none.first(&world), None);

        let many = EntityQuery::new().with::<Position>();
        assert_eq!(many.single(&world), Err(EcsError::MultipleMatchingEntities(3)));
        assert_eq!(many.count(&world), 3);
    }

    #[test]
    fn test_cache_is_stale_until_invalidated() {
        let (mut world, _) = setup();
        let mut query = EntityQuery::new().with::<Velocity>();
        assert_eq!(query.cache(&world).len(), 2);
        assert!(query.is_cached());

        let e = world.create_entity("late").unwrap();
        world.add_component(e, Velocity { x: 0.0, y: 1.0 }).unwrap();

        assert_eq!(query.count(&world), 2);
        query.invalidate();
        assert_eq!(query.count(&world), 3);
    }

    #[test]
    fn test_builder_change_drops_cache() {
        let (world, _) = setup();
        let mut query = EntityQuery::new().with::<Position>();
        query.cache(&world);
        let query = query.without::<Frozen>();
        assert!(!query.is_cached());
        assert_eq!(query.count(&world), 2);
    }
}
