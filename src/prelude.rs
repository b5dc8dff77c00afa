//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use strata_ecs::prelude::*;
//! ```

pub use crate::component::{Bundle, Component, ComponentSet, ComponentTypeId};
pub use crate::config::WorldConfig;
pub use crate::entity::{Entity, EntityId};
pub use crate::error::{EcsError, Result};
pub use crate::event_bus::{Event, EventBus, SubscriptionId};
pub use crate::event_types::{ComponentAdded, ComponentRemoved, EntityCreated, EntityDestroyed};
pub use crate::executor::{RunReport, SystemManager};
pub use crate::query::EntityQuery;
pub use crate::signature::ComponentSignature;
pub use crate::system::{System, SystemPhase};
pub use crate::time::FixedTimestep;
pub use crate::world::World;
