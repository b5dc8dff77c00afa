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

//! Error types

use std::any::Any;
use std::fmt;

use crate::entity::EntityId;

/// ECS error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// World was used after `dispose()`
    WorldDisposed,

    /// Entity id is not known to the world
    EntityNotFound(EntityId),

    /// Entity has no row in the archetype it was expected in
    EntityNotInArchetype(EntityId),

    /// Entity already has a row in the target archetype
    EntityAlreadyInArchetype(EntityId),

    /// Component type is not part of the archetype signature
    ComponentNotInArchetype { component: &'static str },

    /// Entity does not carry the requested component
    ComponentNotFound {
        entity: EntityId,
        component: &'static str,
    },

    /// Component id was never issued by the component registry
    UnknownComponentType(u32),

    /// Same component type supplied twice in one bundle
    DuplicateComponent(&'static str),

    /// Bundle does not cover the archetype signature exactly
    BundleMismatch { expected: usize, found: usize },

    /// Entity id space exhausted
    EntityIdsExhausted,

    /// System of this type is already registered
    SystemAlreadyRegistered(&'static str),

    /// System of this type is not registered
    SystemNotFound(&'static str),

    /// `single()` found nothing
    NoMatchingEntity,

    /// `single()` found more than one entity
    MultipleMatchingEntities(usize),

    /// Configuration value rejected by validation
    InvalidConfig(String),

    /// Configuration document could not be parsed
    ConfigParse(String),

    /// Error raised by user code (systems, event handlers)
    Custom(String),
}

impl EcsError {
    /// Convenience constructor for user-originated errors
    pub fn custom(msg: impl Into<String>) -> Self {
        EcsError::Custom(msg.into())
    }

    /// Turn a caught panic payload into an error
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        EcsError::Custom(format!("panicked: {msg}"))
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::WorldDisposed => write!(f, "World has been disposed"),
            EcsError::EntityNotFound(id) => write!(f, "Entity not found: {id}"),
            EcsError::EntityNotInArchetype(id) => {
                write!(f, "Entity {id} has no row in this archetype")
            }
            EcsError::EntityAlreadyInArchetype(id) => {
                write!(f, "Entity {id} already has a row in this archetype")
            }
            EcsError::ComponentNotInArchetype { component } => {
                write!(f, "Component {component} is not part of the archetype signature")
            }
            EcsError::ComponentNotFound { entity, component } => {
                write!(f, "Entity {entity} has no component {component}")
            }
            EcsError::UnknownComponentType(raw) => {
                write!(f, "Unknown component type id {raw} (not a registered component)")
            }
            EcsError::DuplicateComponent(name) => {
                write!(f, "Component {name} supplied more than once")
            }
            EcsError::BundleMismatch { expected, found } => write!(
                f,
                "Bundle mismatch: archetype has {expected} columns, bundle supplies {found}"
            ),
            EcsError::EntityIdsExhausted => write!(f, "Entity id space exhausted"),
            EcsError::SystemAlreadyRegistered(name) => {
                write!(f, "System already registered: {name}")
            }
            EcsError::SystemNotFound(name) => write!(f, "System not found: {name}"),
            EcsError::NoMatchingEntity => write!(f, "Query matched no entity"),
            EcsError::MultipleMatchingEntities(count) => {
                write!(f, "Query expected a single entity but matched {count}")
            }
            EcsError::InvalidConfig(msg) => write!(f, "Invalid config: {msg}"),
            EcsError::ConfigParse(msg) => write!(f, "Config parse error: {msg}"),
            EcsError::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::ConfigParse(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_entity() {
        let err = EcsError::EntityNotFound(EntityId::from_raw(7));
        assert_eq!(err.to_string(), "Entity not found: Entity(7)");
    }

    #[test]
    fn test_json_error_maps_to_config_parse() {
        let err: EcsError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EcsError::ConfigParse(_)));
    }

    #[test]
    fn test_panic_payload_becomes_custom() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(
            EcsError::from_panic(payload),
            EcsError::Custom("panicked: boom".to_string())
        );
    }
}
