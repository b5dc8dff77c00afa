//! Fixed timestep support.
//!
//! [`FixedTimestep`] accumulates variable frame time and reports how many
//! fixed-size steps are due, which is what
//! [`SystemManager::run_frame`](crate::executor::SystemManager::run_frame)
//! feeds to `fixed_update`.
//!
//! # Examples
//!
//! ```
//! use strata_ecs::time::FixedTimestep;
//! use std::time::Duration;
//!
//! let mut fixed = FixedTimestep::new(50); // 20 ms steps
//! assert_eq!(fixed.tick(Duration::from_millis(45)), 2);
//! ```

use std::time::Duration;

/// Upper bound on fixed steps run in one frame; the remainder is dropped
pub const DEFAULT_MAX_STEPS_PER_FRAME: usize = 8;

/// Fixed timestep accumulator
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    /// Fixed timestep duration
    timestep: Duration,
    /// Accumulated time from variable frame rate
    accumulator: Duration,
    /// Overstep from last frame (for interpolation)
    overstep: Duration,
    max_steps_per_frame: usize,
}

impl FixedTimestep {
    /// Create with given frequency (Hz)
    pub fn new(hz: u32) -> Self {
        Self::from_duration(Duration::from_secs_f64(1.0 / f64::from(hz.max(1))))
    }

    /// Create with explicit timestep duration
    pub fn from_duration(timestep: Duration) -> Self {
        Self {
            timestep,
            accumulator: Duration::ZERO,
            overstep: Duration::ZERO,
            max_steps_per_frame: DEFAULT_MAX_STEPS_PER_FRAME,
        }
    }

    /// Cap the number of steps a single long frame may trigger
    #[must_use]
    pub fn with_max_steps(mut self, max_steps_per_frame: usize) -> Self {
        self.max_steps_per_frame = max_steps_per_frame.max(1);
        self
    }

    /// Update accumulator and return number of fixed steps to run
    pub fn tick(&mut self, delta: Duration) -> usize {
        if self.timestep.is_zero() {
            return 0;
        }
        self.accumulator += delta;

        let mut steps = 0;
        while self.accumulator >= self.timestep {
            self.accumulator -= self.timestep;
            steps += 1;
            if steps == self.max_steps_per_frame {
                // Falling behind: drop the backlog rather than spiral
                if self.accumulator >= self.timestep {
                    self.accumulator = Duration::ZERO;
                }
                break;
            }
        }

        self.overstep = self.accumulator;
        steps
    }

    /// [`tick`](Self::tick) with a delta in seconds; negative deltas count as zero
    pub fn tick_seconds(&mut self, delta_seconds: f32) -> usize {
        self.tick(Duration::from_secs_f32(delta_seconds.max(0.0)))
    }

    /// Get fixed timestep duration
    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Get timestep in seconds
    pub fn timestep_seconds(&self) -> f32 {
        self.timestep.as_secs_f32()
    }

    /// Get overstep (for interpolation)
    pub fn overstep(&self) -> Duration {
        self.overstep
    }

    /// Get overstep as fraction of timestep (0.0 to 1.0)
    pub fn overstep_fraction(&self) -> f32 {
        if self.timestep.as_secs_f32() > 0.0 {
            self.overstep.as_secs_f32() / self.timestep.as_secs_f32()
        } else {
            0.0
        }
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(60) // 60 Hz default
    }
}
