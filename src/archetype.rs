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

//! Archetype storage with row allocation and removal
//!
//! One archetype holds every entity whose component set equals its
//! signature. Each component type gets one contiguous, type-erased column;
//! `column[i]` always belongs to `entities[i]`.

use std::any::type_name;
use std::mem;
use std::ptr;

use ahash::AHashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::{component_info, Bundle, Component, ComponentInfo, ComponentTypeId, RowWriter};
use crate::config::{PoolConfig, DEFAULT_ARCHETYPE_CAPACITY};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::pool::{BufferPool, RawBuffer, SharedBufferPool};
use crate::signature::ComponentSignature;

/// Archetype: Structure of Arrays storage
pub struct Archetype {
    signature: ComponentSignature,
    entities: Vec<EntityId>,
    rows: AHashMap<EntityId, usize>,
    columns: Vec<ComponentColumn>,
    column_indices: FxHashMap<ComponentTypeId, usize>,
    pool: SharedBufferPool,
}

impl Archetype {
    /// Create a standalone archetype with default capacity and its own pool
    pub fn new(signature: ComponentSignature) -> Result<Self> {
        Self::with_pool(
            signature,
            DEFAULT_ARCHETYPE_CAPACITY,
            BufferPool::shared(PoolConfig::default()),
        )
    }

    /// Create archetype whose columns draw buffers from `pool`
    pub fn with_pool(
        signature: ComponentSignature,
        initial_capacity: usize,
        pool: SharedBufferPool,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(signature.len());
        let mut column_indices = FxHashMap::default();
        {
            let mut buffers = pool.lock();
            // Columns follow ascending component id (registration order)
            for id in signature.iter() {
                let info = component_info(id)?;
                column_indices.insert(id, columns.len());
                columns.push(ComponentColumn::new(
                    info,
                    buffers.acquire(info.layout, initial_capacity),
                ));
            }
        }

        Ok(Self {
            signature,
            entities: Vec::with_capacity(initial_capacity),
            rows: AHashMap::with_capacity(initial_capacity),
            columns,
            column_indices,
            pool,
        })
    }

    /// Get signature
    pub fn signature(&self) -> &ComponentSignature {
        &self.signature
    }

    /// Get all entities, in row order
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if archetype is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Rows available before the next column growth
    pub fn capacity(&self) -> usize {
        self.columns
            .iter()
            .map(ComponentColumn::capacity)
            .min()
            .unwrap_or_else(|| self.entities.capacity())
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Row currently occupied by `entity`
    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.rows.get(&entity).copied()
    }

    pub fn has_component(&self, id: ComponentTypeId) -> bool {
        self.column_indices.contains_key(&id)
    }

    /// Get column immutably
    pub fn get_column(&self, id: ComponentTypeId) -> Option<&ComponentColumn> {
        let idx = *self.column_indices.get(&id)?;
        self.columns.get(idx)
    }

    /// Columns in registration order
    pub fn columns(&self) -> &[ComponentColumn] {
        &self.columns
    }

    /// Append a row holding every component of `bundle`.
    ///
    /// The bundle must supply exactly the archetype's component types.
    pub fn add_entity<B: Bundle>(&mut self, entity: EntityId, bundle: B) -> Result<usize> {
        if self.contains(entity) {
            return Err(EcsError::EntityAlreadyInArchetype(entity));
        }

        let ids = B::component_ids();
        for (i, id) in ids.iter().enumerate() {
            if !self.signature.contains(*id) {
                return Err(EcsError::ComponentNotInArchetype {
                    component: component_info(*id)?.name,
                });
            }
            if ids[..i].contains(id) {
                return Err(EcsError::DuplicateComponent(component_info(*id)?.name));
            }
        }
        if ids.len() != self.columns.len() {
            return Err(EcsError::BundleMismatch {
                expected: self.columns.len(),
                found: ids.len(),
            });
        }

        let row = self.attach_row(entity);
        // SAFETY: the row was just reserved and its ids checked against the signature
        unsafe { bundle.write_row(&mut RowWriter::new(self)) };

        if self.columns.iter().any(|c| c.len() != row + 1) {
            let found: usize = self.columns.iter().map(|c| c.len() - row).sum();
            self.rollback_row(entity, row);
            return Err(EcsError::BundleMismatch {
                expected: self.columns.len(),
                found,
            });
        }
        self.debug_check_lockstep();
        Ok(row)
    }

    /// Remove `entity` by swap-and-pop, dropping its components.
    ///
    /// The last row moves into the vacated slot, so this is O(1). Destructors
    /// run after the row is unlinked.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<()> {
        drop(self.detach_entity(entity)?);
        Ok(())
    }

    /// Unlink `entity`'s row without dropping its values yet.
    ///
    /// The values are dropped when the returned guard goes out of scope.
    pub(crate) fn detach_entity(&mut self, entity: EntityId) -> Result<DetachedRow<'_>> {
        let row = self
            .row_of(entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;

        for column in &mut self.columns {
            column.swap_remove_detach(row);
        }
        self.detach_row(entity, row);
        self.debug_check_lockstep();
        Ok(DetachedRow {
            columns: &mut self.columns,
        })
    }

    /// Get component of `entity`
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let row = self.row_of(entity)?;
        self.get_column(ComponentTypeId::of::<T>())?.get::<T>(row)
    }

    /// Get mutable component of `entity`
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let row = self.row_of(entity)?;
        let idx = *self.column_indices.get(&ComponentTypeId::of::<T>())?;
        self.columns[idx].get_mut::<T>(row)
    }

    /// Overwrite a component in place, returning the previous value
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> Result<T> {
        let row = self
            .row_of(entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        let slot = self
            .column_indices
            .get(&ComponentTypeId::of::<T>())
            .and_then(|&idx| self.columns[idx].get_mut::<T>(row))
            .ok_or(EcsError::ComponentNotInArchetype {
                component: type_name::<T>(),
            })?;
        Ok(mem::replace(slot, value))
    }

    /// Dense column of `T`, one value per row
    pub fn component_slice<T: Component>(&self) -> Option<&[T]> {
        self.get_column(ComponentTypeId::of::<T>())?.as_slice::<T>()
    }

    /// Mutable dense column of `T`
    pub fn component_slice_mut<T: Component>(&mut self) -> Option<&mut [T]> {
        let idx = *self.column_indices.get(&ComponentTypeId::of::<T>())?;
        self.columns[idx].as_mut_slice::<T>()
    }

    /// Iterate `(entity, &T)` over live rows. Empty if `T` is not stored here.
    pub fn iter_components<T: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &T)> + Clone + '_ {
        let column = self.component_slice::<T>().unwrap_or(&[]);
        self.entities.iter().copied().zip(column.iter())
    }

    /// Iterate `(entity, &A, &B)` over live rows
    pub fn iter_components2<A: Component, B: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B)> + Clone + '_ {
        let a = self.component_slice::<A>().unwrap_or(&[]);
        let b = self.component_slice::<B>().unwrap_or(&[]);
        self.entities
            .iter()
            .copied()
            .zip(a.iter())
            .zip(b.iter())
            .map(|((entity, a), b)| (entity, a, b))
    }

    /// Iterate `(entity, &A, &B, &C)` over live rows
    pub fn iter_components3<A: Component, B: Component, C: Component>(
        &self,
    ) -> impl Iterator<Item = (EntityId, &A, &B, &C)> + Clone + '_ {
        let a = self.component_slice::<A>().unwrap_or(&[]);
        let b = self.component_slice::<B>().unwrap_or(&[]);
        let c = self.component_slice::<C>().unwrap_or(&[]);
        self.entities
            .iter()
            .copied()
            .zip(a.iter())
            .zip(b.iter())
            .zip(c.iter())
            .map(|(((entity, a), b), c)| (entity, a, b, c))
    }

    /// Entity list plus one mutable column
    pub fn columns_mut<T: Component>(&mut self) -> Option<(&[EntityId], &mut [T])> {
        let idx = *self.column_indices.get(&ComponentTypeId::of::<T>())?;
        Some((&self.entities, self.columns[idx].as_mut_slice::<T>()?))
    }

    /// Entity list plus two distinct mutable columns
    pub fn columns_mut2<A: Component, B: Component>(
        &mut self,
    ) -> Option<(&[EntityId], &mut [A], &mut [B])> {
        let ia = *self.column_indices.get(&ComponentTypeId::of::<A>())?;
        let ib = *self.column_indices.get(&ComponentTypeId::of::<B>())?;
        if ia == ib {
            return None;
        }

        let (ca, cb) = if ia < ib {
            let (left, right) = self.columns.split_at_mut(ib);
            (&mut left[ia], &mut right[0])
        } else {
            let (left, right) = self.columns.split_at_mut(ia);
            (&mut right[0], &mut left[ib])
        };
        Some((&self.entities, ca.as_mut_slice::<A>()?, cb.as_mut_slice::<B>()?))
    }

    /// Move `entity` into `dst`, carrying every component both signatures share.
    ///
    /// `dst` must contain every column of this archetype; the caller pushes any
    /// extra component afterwards. Returns the new row.
    pub(crate) fn migrate_to(&mut self, entity: EntityId, dst: &mut Archetype) -> Result<usize> {
        let row = self
            .row_of(entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        if dst.contains(entity) {
            return Err(EcsError::EntityAlreadyInArchetype(entity));
        }
        debug_assert!(dst.signature.is_superset(&self.signature));

        let new_row = dst.len();
        self.transfer_row(entity, row, Some(dst), None);
        Ok(new_row)
    }

    /// Take `T` out of `entity`'s row by value and move the rest into `dst`.
    ///
    /// With no destination the row is simply removed.
    pub(crate) fn take_and_migrate<T: Component>(
        &mut self,
        entity: EntityId,
        dst: Option<&mut Archetype>,
    ) -> Result<T> {
        let row = self
            .row_of(entity)
            .ok_or(EcsError::EntityNotInArchetype(entity))?;
        if dst.as_deref().is_some_and(|target| target.contains(entity)) {
            return Err(EcsError::EntityAlreadyInArchetype(entity));
        }

        let id = ComponentTypeId::of::<T>();
        let idx = *self
            .column_indices
            .get(&id)
            .ok_or(EcsError::ComponentNotInArchetype {
                component: type_name::<T>(),
            })?;

        // SAFETY: row is live and the column stores T; transfer_row forgets
        // this slot instead of dropping it.
        let value = unsafe { self.columns[idx].read::<T>(row) };
        self.transfer_row(entity, row, dst, Some(id));
        Ok(value)
    }

    /// Append `value` to its column; part of filling a reserved row.
    ///
    /// A type not stored here is dropped; `add_entity` then rejects the row.
    pub(crate) fn push_column_value<T: Component>(&mut self, value: T) {
        if let Some(&idx) = self.column_indices.get(&ComponentTypeId::of::<T>()) {
            self.columns[idx].push(value, &self.pool);
        }
    }

    /// Undo a partially written row appended at `row`
    fn rollback_row(&mut self, entity: EntityId, row: usize) {
        self.entities.truncate(row);
        self.rows.remove(&entity);
        for column in &mut self.columns {
            column.truncate(row);
        }
    }

    pub(crate) fn debug_check_lockstep(&self) {
        debug_assert!(
            self.columns.iter().all(|c| c.len() == self.entities.len()),
            "archetype columns out of lockstep with entity list"
        );
        debug_assert_eq!(self.rows.len(), self.entities.len());
    }

    fn transfer_row(
        &mut self,
        entity: EntityId,
        row: usize,
        mut dst: Option<&mut Archetype>,
        taken: Option<ComponentTypeId>,
    ) {
        let mut dropped: SmallVec<[usize; 4]> = SmallVec::new();
        for (idx, column) in self.columns.iter_mut().enumerate() {
            let id = column.component_id();
            if taken == Some(id) {
                // SAFETY: the value was already read out of this slot
                unsafe { column.swap_remove_forget(row) };
                continue;
            }

            let moved = match dst.as_deref_mut() {
                Some(target) => match target.column_indices.get(&id).copied() {
                    Some(idx) => {
                        // SAFETY: row is live; its bytes move to target and are forgotten here
                        unsafe { target.columns[idx].push_from(column.ptr_at(row), &target.pool) };
                        true
                    }
                    None => false,
                },
                None => false,
            };

            if moved {
                // SAFETY: ownership of the slot moved to the destination column
                unsafe { column.swap_remove_forget(row) };
            } else {
                column.swap_remove_detach(row);
                dropped.push(idx);
            }
        }

        self.detach_row(entity, row);
        if let Some(target) = dst {
            target.attach_row(entity);
        }
        for idx in dropped {
            // SAFETY: this column parked exactly one value past its live rows above
            unsafe { self.columns[idx].drop_detached() };
        }
    }

    fn attach_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        self.rows.insert(entity, row);
        row
    }

    fn detach_row(&mut self, entity: EntityId, row: usize) {
        self.entities.swap_remove(row);
        self.rows.remove(&entity);
        if let Some(&moved) = self.entities.get(row) {
            self.rows.insert(moved, row);
        }
    }
}

/// Type-erased component column
pub struct ComponentColumn {
    info: ComponentInfo,
    buffer: RawBuffer,
    len: usize,
}

impl ComponentColumn {
    fn new(info: ComponentInfo, buffer: RawBuffer) -> Self {
        Self {
            info,
            buffer,
            len: 0,
        }
    }

    pub fn component_id(&self) -> ComponentTypeId {
        self.info.id
    }

    pub fn info(&self) -> &ComponentInfo {
        &self.info
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Get component at index
    pub fn get<T: Component>(&self, row: usize) -> Option<&T> {
        if !self.info.is::<T>() || row >= self.len {
            return None;
        }
        // SAFETY: type checked, row in bounds
        Some(unsafe { &*(self.ptr_at(row) as *const T) })
    }

    /// Get mutable component at index
    pub fn get_mut<T: Component>(&mut self, row: usize) -> Option<&mut T> {
        if !self.info.is::<T>() || row >= self.len {
            return None;
        }
        // SAFETY: type checked, row in bounds
        Some(unsafe { &mut *(self.ptr_at(row) as *mut T) })
    }

    pub fn as_slice<T: Component>(&self) -> Option<&[T]> {
        if !self.info.is::<T>() {
            return None;
        }
        // SAFETY: the first `len` slots hold initialised T values
        Some(unsafe { std::slice::from_raw_parts(self.buffer.as_ptr() as *const T, self.len) })
    }

    pub fn as_mut_slice<T: Component>(&mut self) -> Option<&mut [T]> {
        if !self.info.is::<T>() {
            return None;
        }
        // SAFETY: the first `len` slots hold initialised T values
        Some(unsafe { std::slice::from_raw_parts_mut(self.buffer.as_ptr() as *mut T, self.len) })
    }

    fn item_size(&self) -> usize {
        self.info.layout.size()
    }

    /// # Safety
    /// `row` must be within the buffer capacity.
    unsafe fn ptr_at(&self, row: usize) -> *mut u8 {
        self.buffer.as_ptr().add(row * self.item_size())
    }

    /// Double the buffer when full, copying only the live prefix
    fn reserve_one(&mut self, pool: &SharedBufferPool) {
        if self.len < self.buffer.capacity() {
            return;
        }

        let new_capacity = self.buffer.capacity().max(1) * 2;
        let mut pool = pool.lock();
        let new_buffer = pool.acquire(self.info.layout, new_capacity);
        // SAFETY: both buffers hold at least `len` items of this layout and do not overlap
        unsafe {
            ptr::copy_nonoverlapping(
                self.buffer.as_ptr(),
                new_buffer.as_ptr(),
                self.len * self.item_size(),
            );
        }
        let old = mem::replace(&mut self.buffer, new_buffer);
        pool.release(old);
    }

    fn push<T: Component>(&mut self, value: T, pool: &SharedBufferPool) {
        assert!(
            self.info.is::<T>(),
            "column of {} cannot store {}",
            self.info.name,
            type_name::<T>()
        );
        self.reserve_one(pool);
        // SAFETY: reserve_one guarantees room for one more item of type T
        unsafe { ptr::write(self.ptr_at(self.len) as *mut T, value) };
        self.len += 1;
    }

    /// # Safety
    /// `src` must point to a live value of this column's type; the caller
    /// gives up ownership of it.
    unsafe fn push_from(&mut self, src: *const u8, pool: &SharedBufferPool) {
        self.reserve_one(pool);
        ptr::copy_nonoverlapping(src, self.ptr_at(self.len), self.item_size());
        self.len += 1;
    }

    /// # Safety
    /// `row` must be live and of type T; the slot must then be forgotten.
    unsafe fn read<T: Component>(&self, row: usize) -> T {
        debug_assert!(self.info.is::<T>() && row < self.len);
        ptr::read(self.ptr_at(row) as *const T)
    }

    /// # Safety
    /// The value at `row` must already be moved out or otherwise owned elsewhere.
    unsafe fn swap_remove_forget(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if row != last {
            ptr::copy_nonoverlapping(self.ptr_at(last), self.ptr_at(row), self.item_size());
        }
        self.len = last;
    }

    /// Swap `row` with the last live row and shrink, parking the removed
    /// value in the first slot past `len` until `drop_detached` runs.
    fn swap_remove_detach(&mut self, row: usize) {
        assert!(row < self.len, "row {row} out of bounds ({})", self.len);
        let last = self.len - 1;
        if row != last {
            // SAFETY: both rows are live and distinct
            unsafe { ptr::swap_nonoverlapping(self.ptr_at(row), self.ptr_at(last), self.item_size()) };
        }
        self.len = last;
    }

    /// # Safety
    /// Must follow exactly one `swap_remove_detach` with no push in between.
    unsafe fn drop_detached(&mut self) {
        if let Some(drop_fn) = self.info.drop_fn {
            drop_fn(self.ptr_at(self.len));
        }
    }

    /// Drop every row at or past `len`
    fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let old = mem::replace(&mut self.len, len);
        if let Some(drop_fn) = self.info.drop_fn {
            for row in len..old {
                // SAFETY: rows below the old len were initialised and are now outside the live prefix
                unsafe { drop_fn(self.ptr_at(row)) };
            }
        }
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        self.truncate(0);
    }
}

/// Row values unlinked from an archetype, dropped when this guard drops
pub(crate) struct DetachedRow<'a> {
    columns: &'a mut [ComponentColumn],
}

impl Drop for DetachedRow<'_> {
    fn drop(&mut self) {
        for column in self.columns.iter_mut() {
            // SAFETY: detach_entity parked exactly one value past each column's live rows
            unsafe { column.drop_detached() };
        }
    }
}
