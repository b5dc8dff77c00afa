//! System manager, frame execution and per-system profiling
//!
//! Systems run sequentially in ascending priority. A failing system (error or
//! panic) is logged and reported in the [`RunReport`]; the rest of the frame
//! still runs.

use std::any::{type_name, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::{EcsError, Result};
use crate::system::{BoxedSystem, System, SystemPhase, SystemState};
use crate::time::FixedTimestep;
use crate::world::World;

/// System execution profiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

#[derive(Debug, Clone, Copy)]
struct TimingTotals {
    min: Duration,
    max: Duration,
    total: Duration,
    calls: u64,
}

/// System profiler for collecting update timings
#[derive(Debug, Default)]
pub struct SystemProfiler {
    timings: FxHashMap<&'static str, TimingTotals>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, system: &'static str, duration: Duration) {
        self.timings
            .entry(system)
            .and_modify(|t| {
                t.min = t.min.min(duration);
                t.max = t.max.max(duration);
                t.total += duration;
                t.calls += 1;
            })
            .or_insert(TimingTotals {
                min: duration,
                max: duration,
                total: duration,
                calls: 1,
            });
    }

    pub fn get_stats(&self, system: &str) -> Option<SystemStats> {
        let t = self.timings.get(system)?;
        let avg = u32::try_from(t.calls)
            .map(|calls| t.total / calls)
            .unwrap_or_else(|_| Duration::from_secs_f64(t.total.as_secs_f64() / t.calls as f64));
        Some(SystemStats {
            min: t.min,
            max: t.max,
            avg,
            call_count: t.calls,
        })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
    }
}

/// A system hook that returned an error or panicked
#[derive(Debug, Clone, PartialEq)]
pub struct SystemFailure {
    pub system: &'static str,
    pub phase: SystemPhase,
    pub error: EcsError,
}

/// Outcome of running one phase over all systems
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Systems whose hook was invoked
    pub executed: usize,
    pub failures: Vec<SystemFailure>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: RunReport) {
        self.executed += other.executed;
        self.failures.extend(other.failures);
    }

    fn fail(&mut self, system: &'static str, phase: SystemPhase, error: EcsError) {
        log_failure(system, phase, &error);
        self.failures.push(SystemFailure {
            system,
            phase,
            error,
        });
    }
}

struct SystemEntry {
    system: BoxedSystem,
    type_id: TypeId,
    name: &'static str,
    priority: i32,
    enabled: bool,
    state: SystemState,
}

/// Owns the systems and drives their lifecycle
#[derive(Default)]
pub struct SystemManager {
    systems: Vec<SystemEntry>,
    initialized: bool,
    profiler: SystemProfiler,
}

impl SystemManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system. Once the manager is initialized, the new system is
    /// initialized right away.
    pub fn register_system<S: System>(&mut self, system: S, world: &mut World) -> Result<()> {
        let type_id = TypeId::of::<S>();
        if self.systems.iter().any(|entry| entry.type_id == type_id) {
            return Err(EcsError::SystemAlreadyRegistered(type_name::<S>()));
        }

        let entry = SystemEntry {
            name: system.name(),
            priority: system.priority(),
            system: Box::new(system),
            type_id,
            enabled: true,
            state: SystemState::Registered,
        };
        tracing::debug!(system = entry.name, priority = entry.priority, "registered system");
        self.systems.push(entry);
        // Stable: equal priorities keep registration order
        self.systems.sort_by_key(|entry| entry.priority);

        if self.initialized {
            if let Some(idx) = self.index_of(type_id) {
                let entry = &mut self.systems[idx];
                if let Err(error) = run_hook(entry, world, SystemPhase::Initialize, 0.0) {
                    log_failure(entry.name, SystemPhase::Initialize, &error);
                }
                entry.state = SystemState::Initialized;
            }
        }
        Ok(())
    }

    /// Shut a system down and remove it. Returns false if it was not registered.
    pub fn unregister_system<S: System>(&mut self, world: &mut World) -> bool {
        let Some(idx) = self.index_of(TypeId::of::<S>()) else {
            return false;
        };
        let mut entry = self.systems.remove(idx);
        if entry.state == SystemState::Initialized {
            if let Err(error) = run_hook(&mut entry, world, SystemPhase::Shutdown, 0.0) {
                log_failure(entry.name, SystemPhase::Shutdown, &error);
            }
        }
        tracing::debug!(system = entry.name, "unregistered system");
        true
    }

    /// Initialize every system that has not been initialized yet
    pub fn initialize_systems(&mut self, world: &mut World) -> RunReport {
        let mut report = RunReport::default();
        for entry in &mut self.systems {
            if entry.state != SystemState::Registered {
                continue;
            }
            report.executed += 1;
            if let Err(error) = run_hook(entry, world, SystemPhase::Initialize, 0.0) {
                report.fail(entry.name, SystemPhase::Initialize, error);
            }
            // A failed initialize still leaves the system scheduled
            entry.state = SystemState::Initialized;
        }
        self.initialized = true;
        report
    }

    /// Run `update` on every enabled system
    pub fn update_systems(&mut self, world: &mut World, delta_time: f32) -> RunReport {
        let mut report = RunReport::default();
        for entry in self.systems.iter_mut().filter(|entry| entry.enabled) {
            report.executed += 1;
            let start = Instant::now();
            let result = run_hook(entry, world, SystemPhase::Update, delta_time);
            self.profiler.record_execution(entry.name, start.elapsed());
            if let Err(error) = result {
                report.fail(entry.name, SystemPhase::Update, error);
            }
        }
        report
    }

    /// Run `fixed_update` on every enabled system
    pub fn fixed_update_systems(&mut self, world: &mut World, fixed_delta_time: f32) -> RunReport {
        let mut report = RunReport::default();
        for entry in self.systems.iter_mut().filter(|entry| entry.enabled) {
            report.executed += 1;
            if let Err(error) = run_hook(entry, world, SystemPhase::FixedUpdate, fixed_delta_time)
            {
                report.fail(entry.name, SystemPhase::FixedUpdate, error);
            }
        }
        report
    }

    /// Run due fixed steps, then one update
    pub fn run_frame(
        &mut self,
        world: &mut World,
        timestep: &mut FixedTimestep,
        frame_delta: f32,
    ) -> RunReport {
        #[cfg(feature = "profiling")]
        let _span = info_span!("systems.frame", frame_delta).entered();

        let mut report = RunReport::default();
        let steps = timestep.tick_seconds(frame_delta);
        let fixed_delta = timestep.timestep_seconds();
        for _ in 0..steps {
            report.merge(self.fixed_update_systems(world, fixed_delta));
        }
        report.merge(self.update_systems(world, frame_delta));
        report
    }

    /// Shut down initialized systems in reverse priority order
    pub fn shutdown_systems(&mut self, world: &mut World) -> RunReport {
        let mut report = RunReport::default();
        for entry in self.systems.iter_mut().rev() {
            if entry.state != SystemState::Initialized {
                continue;
            }
            report.executed += 1;
            if let Err(error) = run_hook(entry, world, SystemPhase::Shutdown, 0.0) {
                report.fail(entry.name, SystemPhase::Shutdown, error);
            }
            entry.state = SystemState::Shutdown;
        }
        self.initialized = false;
        report
    }

    pub fn set_system_enabled<S: System>(&mut self, enabled: bool) -> Result<()> {
        let idx = self
            .index_of(TypeId::of::<S>())
            .ok_or(EcsError::SystemNotFound(type_name::<S>()))?;
        self.systems[idx].enabled = enabled;
        Ok(())
    }

    pub fn is_system_enabled<S: System>(&self) -> bool {
        self.index_of(TypeId::of::<S>())
            .is_some_and(|idx| self.systems[idx].enabled)
    }

    pub fn get_system<S: System>(&self) -> Option<&S> {
        let idx = self.index_of(TypeId::of::<S>())?;
        (*self.systems[idx].system).as_any().downcast_ref::<S>()
    }

    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        let idx = self.index_of(TypeId::of::<S>())?;
        (*self.systems[idx].system).as_any_mut().downcast_mut::<S>()
    }

    pub fn system_state<S: System>(&self) -> Option<SystemState> {
        let idx = self.index_of(TypeId::of::<S>())?;
        Some(self.systems[idx].state)
    }

    pub fn is_system_registered<S: System>(&self) -> bool {
        self.index_of(TypeId::of::<S>()).is_some()
    }

    /// Names in execution order
    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|entry| entry.name).collect()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut SystemProfiler {
        &mut self.profiler
    }

    fn index_of(&self, type_id: TypeId) -> Option<usize> {
        self.systems.iter().position(|entry| entry.type_id == type_id)
    }
}

/// Run one lifecycle hook, turning panics into errors
fn run_hook(entry: &mut SystemEntry, world: &mut World, phase: SystemPhase, delta: f32) -> Result<()> {
    #[cfg(feature = "profiling")]
    let _span = info_span!("system", system = entry.name, phase = %phase).entered();

    let system = &mut entry.system;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match phase {
        SystemPhase::Initialize => system.initialize(world),
        SystemPhase::Update => system.update(world, delta),
        SystemPhase::FixedUpdate => system.fixed_update(world, delta),
        SystemPhase::Shutdown => system.shutdown(world),
    }));
    outcome.unwrap_or_else(|payload| Err(EcsError::from_panic(payload)))
}

fn log_failure(system: &'static str, phase: SystemPhase, error: &EcsError) {
    tracing::error!(system, phase = %phase, error = %error, "system failed");
}
