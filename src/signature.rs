//! Component signatures
//!
//! A [`ComponentSignature`] is the set of component types attached to an
//! entity. It keys archetypes and drives query matching. Bits are indexed by
//! registry-assigned [`ComponentTypeId`]s, so two distinct types can never
//! share a bit, and the set grows with the number of registered types.

use std::fmt;

use crate::bitset::BitSet;
use crate::component::{Component, ComponentTypeId};
use crate::error::Result;

/// Order-independent set of component types
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ComponentSignature {
    bits: BitSet,
}

impl ComponentSignature {
    /// Empty signature
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature containing only `T`
    pub fn of<T: Component>() -> Self {
        Self::new().with(ComponentTypeId::of::<T>())
    }

    /// Build from component ids; every id must come from the registry
    pub fn from_ids(ids: &[ComponentTypeId]) -> Result<Self> {
        let mut signature = Self::new();
        for &id in ids {
            ComponentTypeId::from_raw(id.to_raw())?;
            signature.insert(id);
        }
        Ok(signature)
    }

    /// Add an id in place
    pub fn insert(&mut self, id: ComponentTypeId) {
        self.bits.set(id.index());
    }

    /// Remove an id in place
    pub fn remove(&mut self, id: ComponentTypeId) {
        self.bits.clear(id.index());
    }

    /// Copy of this signature with `id` added
    #[must_use]
    pub fn with(&self, id: ComponentTypeId) -> Self {
        let mut next = self.clone();
        next.insert(id);
        next
    }

    /// Copy of this signature with `id` removed
    #[must_use]
    pub fn without(&self, id: ComponentTypeId) -> Self {
        let mut next = self.clone();
        next.remove(id);
        next
    }

    #[must_use]
    pub fn with_type<T: Component>(&self) -> Self {
        self.with(ComponentTypeId::of::<T>())
    }

    #[must_use]
    pub fn without_type<T: Component>(&self) -> Self {
        self.without(ComponentTypeId::of::<T>())
    }

    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.bits.contains(id.index())
    }

    pub fn contains_type<T: Component>(&self) -> bool {
        self.contains(ComponentTypeId::of::<T>())
    }

    /// True if every type of `other` is present here
    pub fn is_superset(&self, other: &Self) -> bool {
        self.bits.is_superset(&other.bits)
    }

    /// True if every type here is present in `other`
    pub fn is_subset(&self, other: &Self) -> bool {
        other.bits.is_superset(&self.bits)
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            bits: self.bits.union(&other.bits),
        }
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            bits: self.bits.intersection(&other.bits),
        }
    }

    /// True if the two signatures share at least one type
    pub fn intersects(&self, other: &Self) -> bool {
        self.bits.intersects(&other.bits)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of component types
    pub fn len(&self) -> usize {
        self.bits.count()
    }

    /// Component ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + Clone + '_ {
        self.bits.ones().map(ComponentTypeId::from_index)
    }
}

impl fmt::Debug for ComponentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.bits.ones())
            .finish()
    }
}

impl FromIterator<ComponentTypeId> for ComponentSignature {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut signature = Self::new();
        for id in iter {
            signature.insert(id);
        }
        signature
    }
}
