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

//! Entity identifiers and records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Unique entity identifier.
///
/// Ids are handed out by a monotonic counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw id. Only meaningful for ids previously obtained from a world.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Entity record owned by the world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Monotonic id allocator. The first id issued is 1.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next id
    pub fn allocate(&mut self) -> Result<EntityId> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or(EcsError::EntityIdsExhausted)?;
        Ok(EntityId(id))
    }

    /// Number of ids issued so far
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        assert_eq!(a.to_raw(), 1);
        assert!(b > a);
        assert_eq!(alloc.issued(), 2);
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut alloc = EntityAllocator { next: u64::MAX };
        assert_eq!(alloc.allocate(), Err(EcsError::EntityIdsExhausted));
    }
}
