//! Software timers serviced by the kernel tick.

use alloc::boxed::Box;
use core::fmt;

use crate::sync::{Arc, Mutex};

/// Callback invoked in timer-service context when a timer expires.
pub type TimerCallback = Box<dyn Fn(&SoftwareTimer) + Send + Sync>;

/// Parameters for creating a timer.
pub struct TimerConfig {
    pub name: &'static str,
    pub period_ticks: u64,
    pub auto_reload: bool,
    pub callback: TimerCallback,
}

impl TimerConfig {
    /// One-shot timer firing `period_ticks` after it is started.
    pub fn new(
        name: &'static str,
        period_ticks: u64,
        callback: impl Fn(&SoftwareTimer) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            period_ticks,
            auto_reload: false,
            callback: Box::new(callback),
        }
    }

    /// Re-arm with the same period after every expiry.
    pub fn auto_reload(mut self) -> Self {
        self.auto_reload = true;
        self
    }
}

struct TimerState {
    remaining: u64,
    active: bool,
    expirations: u64,
}

/// Timer object owned by the kernel; handles are shared `Arc`s.
pub struct SoftwareTimer {
    name: &'static str,
    period_ticks: u64,
    auto_reload: bool,
    callback: TimerCallback,
    state: Mutex<TimerState>,
}

impl SoftwareTimer {
    pub(crate) fn new(config: TimerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: config.name,
            period_ticks: config.period_ticks,
            auto_reload: config.auto_reload,
            callback: config.callback,
            state: Mutex::new(TimerState {
                remaining: 0,
                active: false,
                expirations: 0,
            }),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period_ticks(&self) -> u64 {
        self.period_ticks
    }

    pub fn is_auto_reload(&self) -> bool {
        self.auto_reload
    }

    pub fn is_active(&self) -> bool {
        self.state.with(|state| state.active)
    }

    /// Number of times the callback has run
    pub fn expirations(&self) -> u64 {
        self.state.with(|state| state.expirations)
    }

    /// (Re)start the countdown from a full period.
    pub(crate) fn arm(&self) {
        self.state.with(|state| {
            state.remaining = self.period_ticks;
            state.active = true;
        });
    }

    pub(crate) fn disarm(&self) {
        self.state.with(|state| state.active = false);
    }

    /// Advance one tick; runs the callback if the timer expired.
    pub(crate) fn tick(&self) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }

        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining > 0 {
            return false;
        }

        state.expirations += 1;
        if self.auto_reload {
            state.remaining = self.period_ticks;
        } else {
            state.active = false;
        }
        drop(state);

        (self.callback)(self);
        true
    }
}

impl fmt::Debug for SoftwareTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareTimer")
            .field("name", &self.name)
            .field("period_ticks", &self.period_ticks)
            .field("auto_reload", &self.auto_reload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn auto_reload_timer_fires_every_period() {
        let fired = Arc::new(AtomicU32::new(0));
        let seen = fired.clone();
        let timer = SoftwareTimer::new(
            TimerConfig::new("periodic", 3, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .auto_reload(),
        );

        timer.arm();
        let expired: Vec<bool> = (0..9).map(|_| timer.tick()).collect();
        assert_eq!(
            expired,
            [false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(timer.is_active());
    }

    #[test]
    fn one_shot_timer_disarms_after_expiry() {
        let timer = SoftwareTimer::new(TimerConfig::new("once", 2, |_| {}));
        assert!(!timer.tick());

        timer.arm();
        assert!(!timer.tick());
        assert!(timer.tick());
        assert!(!timer.is_active());
        assert!(!timer.tick());
        assert_eq!(timer.expirations(), 1);
    }

    #[test]
    fn callback_sees_timer_identity() {
        let timer = SoftwareTimer::new(TimerConfig::new("LEDTimer", 1, |t| {
            assert_eq!(t.name(), "LEDTimer");
            assert_eq!(t.expirations(), 1);
        }));
        timer.arm();
        assert!(timer.tick());
    }
}
