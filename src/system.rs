//! System trait and lifecycle metadata

use std::any::Any;
use std::fmt;

use crate::error::Result;
use crate::world::World;

/// Upcast to [`Any`] so registered systems can be looked up by concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// System trait
///
/// Only [`System::update`] is required. Lower [`System::priority`] values run
/// earlier; equal priorities keep registration order.
pub trait System: AsAny + Send {
    /// Get system name
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn priority(&self) -> i32 {
        0
    }

    /// Called once before the first update
    fn initialize(&mut self, _world: &mut World) -> Result<()> {
        Ok(())
    }

    /// Called once per frame with the frame delta in seconds
    fn update(&mut self, world: &mut World, delta_time: f32) -> Result<()>;

    /// Called zero or more times per frame with the fixed step in seconds
    fn fixed_update(&mut self, _world: &mut World, _fixed_delta_time: f32) -> Result<()> {
        Ok(())
    }

    /// Called once when the system is unregistered or the manager shuts down
    fn shutdown(&mut self, _world: &mut World) -> Result<()> {
        Ok(())
    }
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

/// Lifecycle hook being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemPhase {
    Initialize,
    Update,
    FixedUpdate,
    Shutdown,
}

impl fmt::Display for SystemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemPhase::Initialize => "initialize",
            SystemPhase::Update => "update",
            SystemPhase::FixedUpdate => "fixed_update",
            SystemPhase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Where a registered system is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Registered,
    Initialized,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spawner;

    impl System for Spawner {
        fn update(&mut self, world: &mut World, _delta_time: f32) -> Result<()> {
            let entity = world.create_entity("spawned")?;
            world.add_component(entity, 42i32)?;
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        let system = Spawner;
        assert_eq!(system.priority(), 0);
        assert!(system.name().ends_with("Spawner"));
    }

    #[test]
    fn test_system_run_signature() {
        let mut world = World::new();
        let mut system = Spawner;
        system.initialize(&mut world).unwrap();
        system.update(&mut world, 0.016).unwrap();
        system.fixed_update(&mut world, 0.02).unwrap();
        assert_eq!(world.iter::<i32>().count(), 1);
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: BoxedSystem = Box::new(Spawner);
        assert!(boxed.as_ref().as_any().downcast_ref::<Spawner>().is_some());
        assert_eq!(SystemPhase::FixedUpdate.to_string(), "fixed_update");
    }
}
