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

//! Strata ECS - archetype-based Entity Component System
//!
//! Entities are grouped by their exact component set into archetypes with
//! columnar storage. A [`World`] owns entities, components and lifecycle
//! events; a [`SystemManager`] runs prioritised systems against it each frame.

pub mod archetype;
pub mod bitset;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod event_bus;
pub mod event_types;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod profiling;
pub mod query;
pub mod signature;
pub mod storage;
pub mod system;
pub mod time;
pub mod world;


pub use archetype::*;
pub use component::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use event_bus::*;
pub use event_types::*;
pub use executor::*;
pub use query::*;
pub use signature::*;
pub use storage::*;
pub use system::*;
pub use time::*;
pub use world::*;
