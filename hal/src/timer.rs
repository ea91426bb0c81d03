//! Free-running timebase abstraction
//!
//! The system timer is a 64-bit up-counter that never stops and silently
//! wraps. Consumers compute elapsed time with wrapping subtraction.

use core::cell::Cell;

use critical_section::Mutex;

/// Monotonic free-running counter.
pub trait Timebase: Send + Sync {
    /// Current counter value
    fn counter(&self) -> u64;

    /// Counter increments per second
    fn frequency_hz(&self) -> u64;

    /// Ticks elapsed since `start`, tolerant of one counter wrap.
    fn elapsed_since(&self, start: u64) -> u64 {
        self.counter().wrapping_sub(start)
    }
}

#[derive(Clone, Copy)]
struct SimState {
    now: u64,
    step: u64,
}

/// Deterministic timebase for host simulation and tests.
///
/// The counter only moves when told to: explicitly through
/// [`SimTimebase::advance`], or by `step` ticks after every
/// [`Timebase::counter`] read. A non-zero step models the counter running
/// while software polls it, which is what lets a busy wait terminate.
pub struct SimTimebase {
    frequency_hz: u64,
    state: Mutex<Cell<SimState>>,
}

impl SimTimebase {
    pub const fn new(frequency_hz: u64) -> Self {
        Self::starting_at(frequency_hz, 0)
    }

    /// Timebase whose counter starts at `start` (useful to exercise wrap).
    pub const fn starting_at(frequency_hz: u64, start: u64) -> Self {
        Self {
            frequency_hz,
            state: Mutex::new(Cell::new(SimState {
                now: start,
                step: 0,
            })),
        }
    }

    /// Set how far the counter moves on each read.
    pub fn with_step(self, step: u64) -> Self {
        self.set_step(step);
        self
    }

    pub fn set_step(&self, step: u64) {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            state.step = step;
            cell.set(state);
        });
    }

    /// Move the counter forward by `ticks`, wrapping at `u64::MAX`.
    pub fn advance(&self, ticks: u64) {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            state.now = state.now.wrapping_add(ticks);
            cell.set(state);
        });
    }

    /// Counter value without the read side effect.
    pub fn peek(&self) -> u64 {
        critical_section::with(|cs| self.state.borrow(cs).get().now)
    }
}

impl Timebase for SimTimebase {
    fn counter(&self) -> u64 {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            let value = state.now;
            state.now = state.now.wrapping_add(state.step);
            cell.set(state);
            value
        })
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

/// Wall-clock backed timebase for running the demo in real time on a host.
#[cfg(feature = "std")]
pub struct MonotonicTimebase {
    frequency_hz: u64,
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicTimebase {
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Timebase for MonotonicTimebase {
    fn counter(&self) -> u64 {
        let nanos = self.epoch.elapsed().as_nanos();
        (nanos * self.frequency_hz as u128 / 1_000_000_000) as u64
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}
