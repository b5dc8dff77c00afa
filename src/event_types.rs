//! World lifecycle events
//!
//! Every structural mutation of a [`World`](crate::world::World) publishes one
//! of these on the world's event bus.

use crate::component::ComponentTypeId;
use crate::entity::EntityId;

/// Macro for defining events with automatic Event trait implementation
#[macro_export]
macro_rules! define_event {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $(pub $field : $ty),*
        }

        impl $crate::event_bus::Event for $name {
            fn event_name(&self) -> &str {
                stringify!($name)
            }
        }
    };

    // Support for unit structs (no fields)
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name;

        impl $crate::event_bus::Event for $name {
            fn event_name(&self) -> &str {
                stringify!($name)
            }
        }
    };
}

define_event! {
    /// An entity was created
    pub struct EntityCreated {
        entity: EntityId,
        name: String,
    }
}

define_event! {
    /// An entity and all of its components were destroyed
    pub struct EntityDestroyed {
        entity: EntityId,
        name: String,
    }
}

define_event! {
    /// A component was attached (or overwritten)
    pub struct ComponentAdded {
        entity: EntityId,
        component: ComponentTypeId,
        type_name: &'static str,
    }
}

define_event! {
    /// A component was detached
    pub struct ComponentRemoved {
        entity: EntityId,
        component: ComponentTypeId,
        type_name: &'static str,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::Event;

    define_event! {
        struct LevelLoaded;
    }

    #[test]
    fn test_event_names() {
        let created = EntityCreated {
            entity: EntityId::from_raw(1),
            name: "A".to_string(),
        };
        assert_eq!(created.event_name(), "EntityCreated");
        assert_eq!(LevelLoaded.event_name(), "LevelLoaded");
    }
}
