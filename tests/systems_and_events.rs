use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strata_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Health(i32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Poisoned;

type Log = Arc<Mutex<Vec<String>>>;

struct PoisonTick {
    log: Log,
}

impl System for PoisonTick {
    fn name(&self) -> &'static str {
        "poison_tick"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn initialize(&mut self, _world: &mut World) -> Result<()> {
        Err(EcsError::custom("no poison table"))
    }

    fn update(&mut self, world: &mut World, _delta_time: f32) -> Result<()> {
        let targets = EntityQuery::new()
            .with::<Health>()
            .with::<Poisoned>()
            .to_vec(world);
        for entity in targets {
            if let Some(health) = world.get_component_mut::<Health>(entity) {
                health.0 -= 1;
            }
        }
        self.log.lock().push("poison".to_string());
        Ok(())
    }
}

struct Reaper {
    log: Log,
}

impl System for Reaper {
    fn name(&self) -> &'static str {
        "reaper"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn update(&mut self, world: &mut World, _delta_time: f32) -> Result<()> {
        let dead = EntityQuery::new()
            .filter::<Health, _>(|h| h.0 <= 0)
            .to_vec(world);
        for entity in dead {
            world.destroy_entity(entity)?;
        }
        self.log.lock().push("reaper".to_string());
        Ok(())
    }
}

struct Exploder;

impl System for Exploder {
    fn name(&self) -> &'static str {
        "exploder"
    }

    fn update(&mut self, _world: &mut World, _delta_time: f32) -> Result<()> {
        panic!("exploder always panics");
    }
}

#[test]
fn test_failed_initialize_keeps_system_running() {
    let mut world = World::new();
    let log: Log = Arc::default();
    let mut manager = SystemManager::new();
    manager
        .register_system(PoisonTick { log: log.clone() }, &mut world)
        .unwrap();

    let report = manager.initialize_systems(&mut world);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].phase, SystemPhase::Initialize);

    manager.update_systems(&mut world, 0.1);
    assert_eq!(*log.lock(), vec!["poison".to_string()]);
}

#[test]
fn test_panicking_system_is_isolated() {
    let mut world = World::new();
    let log: Log = Arc::default();
    let victim = world
        .create_entity_with("victim", (Health(2), Poisoned))
        .unwrap();

    let mut manager = SystemManager::new();
    manager.register_system(Reaper { log: log.clone() }, &mut world).unwrap();
    manager.register_system(Exploder, &mut world).unwrap();
    manager
        .register_system(PoisonTick { log: log.clone() }, &mut world)
        .unwrap();
    manager.initialize_systems(&mut world);
    assert_eq!(manager.system_names(), vec!["exploder", "poison_tick", "reaper"]);

    for _ in 0..2 {
        let report = manager.update_systems(&mut world, 0.1);
        assert_eq!(report.executed, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].system, "exploder");
    }

    assert!(!world.contains_entity(victim));
    assert_eq!(log.lock().len(), 4);
}

#[test]
fn test_subscriber_failures_do_not_block_others() {
    let mut world = World::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    world
        .events_mut()
        .subscribe::<EntityCreated, _>(|_| Err(EcsError::custom("rejects everything")));
    world
        .events_mut()
        .subscribe::<EntityCreated, _>(|e| panic!("cannot handle {}", e.name));
    let sink = seen.clone();
    world.events_mut().subscribe::<EntityCreated, _>(move |e| {
        sink.lock().push(e.entity);
        Ok(())
    });

    let a = world.create_entity("a").unwrap();
    let b = world.create_entity("b").unwrap();

    assert_eq!(*seen.lock(), vec![a, b]);
    assert_eq!(world.events().failure_count(), 4);
}

#[test]
fn test_destroy_with_components_publishes_single_event() {
    let mut world = World::new();
    let counts = Arc::new(Mutex::new((0, 0)));

    let c = counts.clone();
    world.events_mut().subscribe::<ComponentRemoved, _>(move |_| {
        c.lock().0 += 1;
        Ok(())
    });
    let c = counts.clone();
    world.events_mut().subscribe::<EntityDestroyed, _>(move |_| {
        c.lock().1 += 1;
        Ok(())
    });

    let e = world.create_entity_with("e", (Health(1), Poisoned)).unwrap();
    world.destroy_entity(e).unwrap();

    assert_eq!(*counts.lock(), (0, 1));
    assert_eq!(world.storage().tracked_entity_count(), 0);
}

#[test]
fn test_cached_query_snapshot_goes_stale() {
    let mut world = World::new();
    world.create_entity_with("a", (Health(3),)).unwrap();

    let mut query = EntityQuery::new().with::<Health>();
    assert_eq!(query.cache(&world).len(), 1);

    let b = world.create_entity_with("b", (Health(4),)).unwrap();
    assert_eq!(query.to_vec(&world).len(), 1);
    assert!(!query.to_vec(&world).contains(&b));

    query.invalidate();
    assert_eq!(query.count(&world), 2);
}

#[test]
fn test_run_frame_with_fixed_timestep() {
    struct Physics {
        steps: u32,
        updates: u32,
    }

    impl System for Physics {
        fn update(&mut self, _world: &mut World, _delta_time: f32) -> Result<()> {
            self.updates += 1;
            Ok(())
        }

        fn fixed_update(&mut self, _world: &mut World, fixed_delta_time: f32) -> Result<()> {
            assert!((fixed_delta_time - 0.02).abs() < 1e-6);
            self.steps += 1;
            Ok(())
        }
    }

    let mut world = World::new();
    let mut manager = SystemManager::new();
    manager
        .register_system(Physics { steps: 0, updates: 0 }, &mut world)
        .unwrap();
    manager.initialize_systems(&mut world);

    let mut timestep = FixedTimestep::new(50);
    for _ in 0..5 {
        manager.run_frame(&mut world, &mut timestep, 0.03);
    }

    let physics = manager.get_system::<Physics>().unwrap();
    assert_eq!(physics.updates, 5);
    assert_eq!(physics.steps, 7);
}

struct Volatile {
    armed: Arc<AtomicBool>,
    drops: Arc<AtomicUsize>,
}

impl Drop for Volatile {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("volatile component blew up");
        }
    }
}

struct Demolisher;

impl System for Demolisher {
    fn update(&mut self, world: &mut World, _delta_time: f32) -> Result<()> {
        let doomed = EntityQuery::new().with::<Poisoned>().to_vec(world);
        for entity in doomed {
            world.destroy_entity(entity)?;
        }
        Ok(())
    }
}

#[test]
fn test_panicking_component_drop_during_destroy() {
    let armed = Arc::new(AtomicBool::new(true));
    let drops = Arc::new(AtomicUsize::new(0));
    let volatile = || Volatile {
        armed: armed.clone(),
        drops: drops.clone(),
    };

    let mut world = World::new();
    let doomed = world
        .create_entity_with("doomed", (volatile(), Health(1), Poisoned))
        .unwrap();
    let bystander = world
        .create_entity_with("bystander", (volatile(), Health(7), Poisoned))
        .unwrap();
    let survivor = world.create_entity_with("survivor", (volatile(), Health(9))).unwrap();

    let mut manager = SystemManager::new();
    manager.register_system(Demolisher, &mut world).unwrap();
    manager.initialize_systems(&mut world);

    let report = manager.update_systems(&mut world, 0.1);
    assert_eq!(report.failures.len(), 1);
    assert!(!world.contains_entity(doomed));
    assert!(!world.has_component::<Health>(doomed));
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    // The next frame finishes the job on an intact world
    assert!(manager.update_systems(&mut world, 0.1).is_ok());
    assert!(!world.contains_entity(bystander));
    assert_eq!(world.get_component::<Health>(survivor), Some(&Health(9)));
    assert_eq!(world.storage().tracked_entity_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 2);

    drop(world);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}
