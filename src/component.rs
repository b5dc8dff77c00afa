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

//! Component, ComponentSet and Bundle traits
//!
//! Components are data attached to entities. Every component type receives a
//! dense [`ComponentTypeId`] from a process-wide registry the first time it is
//! used; ids are assigned by a monotonic counter and never collide.
//! Bundles group multiple components for spawning.

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::signature::ComponentSignature;
use crate::world::World;

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// Dense, collision-free component type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    /// Id of `T`, registering the type on first use
    pub fn of<T: Component>() -> Self {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = registry().read().by_type.get(&type_id) {
            return id;
        }

        let mut reg = registry().write();
        // Another caller may have registered between the two locks
        if let Some(&id) = reg.by_type.get(&type_id) {
            return id;
        }
        let id = ComponentTypeId(reg.infos.len() as u32);
        reg.infos.push(ComponentInfo::new::<T>(id));
        reg.by_type.insert(type_id, id);
        tracing::trace!(component = std::any::type_name::<T>(), id = id.0, "registered component type");
        id
    }

    /// Bit index inside a signature
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Only for bits that were set from a registered id
    pub(crate) fn from_index(index: usize) -> Self {
        ComponentTypeId(index as u32)
    }

    /// Raw numeric value
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// Validate a raw id against the registry
    pub fn from_raw(raw: u32) -> Result<Self> {
        if (raw as usize) < registry().read().infos.len() {
            Ok(ComponentTypeId(raw))
        } else {
            Err(EcsError::UnknownComponentType(raw))
        }
    }

    /// Registered type information
    pub fn info(self) -> Result<ComponentInfo> {
        component_info(self)
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

/// Type-erased descriptor of a registered component type
#[derive(Debug, Clone, Copy)]
pub struct ComponentInfo {
    pub id: ComponentTypeId,
    pub name: &'static str,
    pub type_id: TypeId,
    pub layout: Layout,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
}

impl ComponentInfo {
    fn new<T: Component>(id: ComponentTypeId) -> Self {
        Self {
            id,
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(drop_ptr::<T> as unsafe fn(*mut u8))
            } else {
                None
            },
        }
    }

    /// True if this descriptor belongs to `T`
    pub fn is<T: Component>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

unsafe fn drop_ptr<T>(ptr: *mut u8) {
    std::ptr::drop_in_place(ptr as *mut T);
}

#[derive(Default)]
struct ComponentRegistry {
    by_type: AHashMap<TypeId, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

fn registry() -> &'static RwLock<ComponentRegistry> {
    static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(ComponentRegistry::default()))
}

/// Look up the descriptor for a registered id
pub fn component_info(id: ComponentTypeId) -> Result<ComponentInfo> {
    registry()
        .read()
        .infos
        .get(id.index())
        .copied()
        .ok_or(EcsError::UnknownComponentType(id.0))
}

/// Number of distinct component types registered in this process
pub fn registered_component_count() -> usize {
    registry().read().infos.len()
}

/// Static set of component types (a tuple of components)
pub trait ComponentSet: 'static {
    /// Component ids in tuple order
    fn component_ids() -> SmallVec<[ComponentTypeId; MAX_BUNDLE_COMPONENTS]>;

    /// Signature of the set
    fn signature() -> ComponentSignature {
        let mut signature = ComponentSignature::new();
        for id in Self::component_ids() {
            signature.insert(id);
        }
        signature
    }
}

/// Writes a bundle into a freshly reserved archetype row.
///
/// Only the crate can construct one.
pub struct RowWriter<'a> {
    archetype: &'a mut Archetype,
}

impl<'a> RowWriter<'a> {
    pub(crate) fn new(archetype: &'a mut Archetype) -> Self {
        Self { archetype }
    }

    /// Append one component value to its column
    pub fn push<T: Component>(&mut self, value: T) {
        self.archetype.push_column_value(value);
    }
}

/// Bundle of components
///
/// Allows spawning entities with multiple components at once.
pub trait Bundle: ComponentSet + Send + Sync {
    /// Write every component into the archetype row
    ///
    /// # Safety
    /// Must push each type of `component_ids()` exactly once and nothing else.
    /// Rows that break this are rolled back and rejected.
    unsafe fn write_row(self, writer: &mut RowWriter<'_>);

    /// Attach every component to `entity` through the world facade
    fn insert_into(self, world: &mut World, entity: EntityId) -> Result<()>;
}

// DO NOT implement Bundle for T: Component
// This conflicts with tuple implementations
// Instead, implement only for tuples

// Macro for tuple ComponentSet / Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> ComponentSet for ($($T,)*) {
            fn component_ids() -> SmallVec<[ComponentTypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(ComponentTypeId::of::<$T>()),*]
            }
        }

        impl<$($T: Component),*> Bundle for ($($T,)*) {
            #[allow(non_snake_case)]
            unsafe fn write_row(self, writer: &mut RowWriter<'_>) {
                let ($($T,)*) = self;
                $(writer.push($T);)*
            }

            #[allow(non_snake_case)]
            fn insert_into(self, world: &mut World, entity: EntityId) -> Result<()> {
                let ($($T,)*) = self;
                $(world.add_component(entity, $T)?;)*
                Ok(())
            }
        }
    };
}

// Implement for tuples of 1-8 components
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    #![allow(dead_code)]
    use super::*;

    #[test]
    fn test_ids_are_stable_and_distinct() {
        struct Position {
            x: f32,
        }
        struct Velocity {
            x: f32,
        }

        let a = ComponentTypeId::of::<Position>();
        let b = ComponentTypeId::of::<Velocity>();
        assert_ne!(a, b);
        assert_eq!(a, ComponentTypeId::of::<Position>());
        assert!(registered_component_count() > a.index().max(b.index()));
    }

    #[test]
    fn test_info_records_layout_and_drop() {
        struct Label(String);

        let info = ComponentTypeId::of::<Label>().info().unwrap();
        assert!(info.is::<Label>());
        assert_eq!(info.layout, Layout::new::<Label>());
        assert!(info.drop_fn.is_some());

        let plain = ComponentTypeId::of::<u8>().info().unwrap();
        assert!(plain.drop_fn.is_none());
    }

    #[test]
    fn test_unknown_raw_id_is_rejected() {
        assert_eq!(
            ComponentTypeId::from_raw(u32::MAX),
            Err(EcsError::UnknownComponentType(u32::MAX))
        );
    }

    #[test]
    fn test_bundle_signature_is_order_independent() {
        struct A;
        struct B;

        assert_eq!(<(A, B)>::signature(), <(B, A)>::signature());
        assert_eq!(<(A, B)>::component_ids().len(), 2);
    }
}
