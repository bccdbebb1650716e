//! Simulation clock
//!
//! Keeps simulated time aligned with wall time. Each call consumes the
//! elapsed wall-clock delta by stepping the world a bounded number of times,
//! so a late invocation (scheduling jitter, a long tick) is caught up rather
//! than lost, and the loop length is always proportional to the actual lag.

use std::time::Instant;

use crate::game::constants::physics::TIME_STEP;
use crate::game::world::PhysicsWorld;

pub struct SimulationClock {
    last_time: Instant,
    time_step: f32,
}

impl SimulationClock {
    pub fn new(now: Instant) -> Self {
        Self {
            last_time: now,
            time_step: TIME_STEP,
        }
    }

    /// Advance simulated time to `now`.
    ///
    /// Steps the world by `min(remaining, time_step)` until the elapsed
    /// duration is consumed; one invocation with elapsed `D` performs
    /// `ceil(D / time_step)` steps. Returns the step count.
    pub fn advance(&mut self, now: Instant, world: &mut PhysicsWorld) -> u32 {
        let mut remaining = now.saturating_duration_since(self.last_time).as_secs_f32();
        self.last_time = now;

        let mut steps = 0;
        while remaining > 0.0 {
            let consumed = remaining.min(self.time_step);
            world.step();
            remaining -= consumed;
            steps += 1;
        }
        steps
    }
}
