use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{Duration, Local, NaiveDateTime};

use crate::limits::MAX_CLOCK_SPEED;

/// Source of the current local wall-clock instant. Every scheduling call
/// receives one of these instead of reading the system time itself.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Real local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

struct SimState {
    /// Simulated instant at `anchor_real`.
    anchor_sim: NaiveDateTime,
    anchor_real: Instant,
    speed: f64,
    paused: bool,
}

impl SimState {
    fn current(&self) -> NaiveDateTime {
        if self.paused {
            return self.anchor_sim;
        }
        let scaled_ms = self.anchor_real.elapsed().as_secs_f64() * self.speed * 1000.0;
        Duration::try_milliseconds(scaled_ms as i64)
            .and_then(|d| self.anchor_sim.checked_add_signed(d))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Fold elapsed simulated time into the anchor so that speed and pause
    /// changes never make the clock jump.
    fn rebase(&mut self) {
        self.anchor_sim = self.current();
        self.anchor_real = Instant::now();
    }
}

/// Accelerated clock with pause, resume and manual jumps.
///
/// A paused `SimClock` only moves through `jump_to` / `advance`, which makes
/// reconciliation ticks deterministic under test.
pub struct SimClock {
    state: Mutex<SimState>,
}

impl SimClock {
    pub fn running(start: NaiveDateTime, speed: f64) -> Self {
        Self {
            state: Mutex::new(SimState {
                anchor_sim: start,
                anchor_real: Instant::now(),
                speed: sanitize_speed(speed),
                paused: false,
            }),
        }
    }

    pub fn paused(start: NaiveDateTime) -> Self {
        let clock = Self::running(start, 1.0);
        clock.pause();
        clock
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn speed(&self) -> f64 {
        self.state().speed
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn set_speed(&self, speed: f64) {
        let mut s = self.state();
        s.rebase();
        s.speed = sanitize_speed(speed);
    }

    pub fn pause(&self) {
        let mut s = self.state();
        s.rebase();
        s.paused = true;
    }

    pub fn resume(&self) {
        let mut s = self.state();
        s.rebase();
        s.paused = false;
    }

    /// Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        let mut s = self.state();
        s.rebase();
        s.paused = !s.paused;
        s.paused
    }

    pub fn jump_to(&self, t: NaiveDateTime) {
        let mut s = self.state();
        s.anchor_sim = t;
        s.anchor_real = Instant::now();
    }

    pub fn advance(&self, by: Duration) {
        let mut s = self.state();
        s.rebase();
        s.anchor_sim += by;
    }

    /// Back to `now` at real-time speed, running.
    pub fn reset(&self, now: NaiveDateTime) {
        let mut s = self.state();
        s.anchor_sim = now;
        s.anchor_real = Instant::now();
        s.speed = 1.0;
        s.paused = false;
    }
}

impl Clock for SimClock {
    fn now(&self) -> NaiveDateTime {
        self.state().current()
    }
}

/// Non-finite or negative speeds mean real time; anything faster than
/// `MAX_CLOCK_SPEED` runs at that speed.
fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed >= 0.0 {
        speed.min(MAX_CLOCK_SPEED)
    } else {
        1.0
    }
}
