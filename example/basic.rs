//! Example: Basic ECS usage
//!
//! Creates a few entities, wires up event logging, runs two systems for a
//! handful of frames and tears everything down.

use strata_ecs::prelude::*;

// Define components
#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Health(u32);

struct Movement;

impl System for Movement {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(&mut self, world: &mut World, delta_time: f32) -> Result<()> {
        world.for_each_mut2::<Position, Velocity, _>(|_, p, v| {
            p.x += v.x * delta_time;
            p.y += v.y * delta_time;
        });
        Ok(())
    }
}

struct Report;

impl System for Report {
    fn name(&self) -> &'static str {
        "report"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn update(&mut self, world: &mut World, _delta_time: f32) -> Result<()> {
        for (entity, position) in world.iter::<Position>() {
            println!("  {entity} at ({:.2}, {:.2})", position.x, position.y);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    #[cfg(feature = "profiling")]
    strata_ecs::profiling::init_tracing();

    let mut world = World::new();
    world.events_mut().subscribe::<EntityCreated, _>(|e| {
        println!("created {} ({})", e.entity, e.name);
        Ok(())
    });
    world.events_mut().subscribe::<EntityDestroyed, _>(|e| {
        println!("destroyed {} ({})", e.entity, e.name);
        Ok(())
    });

    println!("Creating entities...");
    let runner = world.create_entity_with(
        "runner",
        (Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.5 }),
    )?;
    let tank = world.create_entity_with(
        "tank",
        (
            Position { x: 10.0, y: 20.0 },
            Velocity { x: -1.0, y: 2.0 },
            Health(100),
        ),
    )?;
    let marker = world.create_entity_with("marker", (Position { x: 5.0, y: 5.0 },))?;

    println!(
        "{} entities in {} archetypes",
        world.entity_count(),
        world.storage().archetype_count()
    );

    let mut systems = SystemManager::new();
    systems.register_system(Report, &mut world)?;
    systems.register_system(Movement, &mut world)?;
    systems.initialize_systems(&mut world);

    for frame in 0..3 {
        println!("Frame {frame}");
        systems.update_systems(&mut world, 0.5);
    }

    let healthy = EntityQuery::new().with::<Health>().to_vec(&world);
    println!("Entities with health: {healthy:?}");

    if let Some(velocity) = world.remove_component::<Velocity>(runner)? {
        println!("{runner} stopped (was moving at {velocity:?})");
    }

    world.destroy_entity(tank)?;
    println!("{marker} still alive: {}", world.contains_entity(marker));

    systems.shutdown_systems(&mut world);
    world.dispose();
    Ok(())
}
