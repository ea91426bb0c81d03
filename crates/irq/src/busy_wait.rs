//! Blocking delay on the free-running timebase
//!
//! Used inside interrupt handlers, where the scheduler's delay services are
//! not available. The wait spins on the counter and keeps spinning until the
//! wrapped difference from the start reading reaches the target, so a counter
//! wrap during the wait is harmless.

use hal::timer::Timebase;

/// Busy-wait helper bound to one timebase.
pub struct BusyWaitTimer<'a, T: Timebase + ?Sized> {
    timebase: &'a T,
}

impl<'a, T: Timebase + ?Sized> BusyWaitTimer<'a, T> {
    pub fn new(timebase: &'a T) -> Self {
        Self { timebase }
    }

    /// Spin for at least `seconds` whole seconds. Returns the ticks observed.
    pub fn wait_seconds(&self, seconds: u32) -> u64 {
        self.wait_seconds_with(seconds, || {})
    }

    /// As [`wait_seconds`](Self::wait_seconds), calling `on_poll` between
    /// counter reads. Interrupt handlers use the hook as a preemption point.
    pub fn wait_seconds_with(&self, seconds: u32, on_poll: impl FnMut()) -> u64 {
        let target = u64::from(seconds).saturating_mul(self.timebase.frequency_hz());
        let elapsed = self.wait_ticks_with(target, on_poll);
        log::info!("-----------------Waited {} seconds.", seconds);
        elapsed
    }

    /// Spin until `ticks` counter increments have elapsed.
    pub fn wait_ticks_with(&self, ticks: u64, mut on_poll: impl FnMut()) -> u64 {
        let start = self.timebase.counter();
        if ticks == 0 {
            return 0;
        }

        loop {
            let elapsed = self.timebase.counter().wrapping_sub(start);
            if elapsed >= ticks {
                return elapsed;
            }
            on_poll();
            core::hint::spin_loop();
        }
    }
}

/// Spin for at least `seconds` seconds on `timebase`.
pub fn wait_seconds<T: Timebase + ?Sized>(timebase: &T, seconds: u32) -> u64 {
    BusyWaitTimer::new(timebase).wait_seconds(seconds)
}
