//! Deterministic host simulation of the demo board.
//!
//! The system timer is a [`SimTimebase`] that advances a few ticks on every
//! read, so busy waits inside handlers consume simulated time. Between kernel
//! ticks the machine moves the timer to the start of the next tick (unless a
//! handler already pushed it past that point), presses any buttons that are
//! due, then takes interrupts and runs the tick.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hal::timer::{SimTimebase, Timebase};

use crate::board::{Board, Button};
use crate::boot::{Boot, HaltReason, System};
use crate::config::DemoConfig;
use crate::trace::{Led, TraceHook};

/// Counter reads per simulated second of busy waiting
const POLLS_PER_SECOND: u64 = 1_024;

/// Button press scheduled at a point in simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub button: Button,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid press '{0}': expected a@<ms> or b@<ms>")]
pub struct ParsePressError(String);

impl FromStr for ButtonPress {
    type Err = ParsePressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePressError(s.to_string());
        let (button, at) = s.split_once('@').ok_or_else(err)?;
        let button = match button.trim() {
            "a" | "A" | "1" => Button::One,
            "b" | "B" | "2" => Button::Two,
            _ => return Err(err()),
        };
        let at_ms = at.trim().parse().map_err(|_| err())?;
        Ok(Self { button, at_ms })
    }
}

impl fmt::Display for ButtonPress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.button {
            Button::One => "a",
            Button::Two => "b",
        };
        write!(f, "{}@{}", name, self.at_ms)
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub red_toggles: u32,
    pub green_toggles: u32,
    pub blue_toggles: u32,
    pub halted: Option<HaltReason>,
}

pub struct Machine {
    system: System,
    timebase: Arc<SimTimebase>,
    epoch: u64,
    presses: VecDeque<ButtonPress>,
}

impl Machine {
    /// Boot the demo on a simulated board.
    pub fn boot(config: DemoConfig, trace: Option<TraceHook>) -> Result<Self, HaltReason> {
        let step = (config.timer_freq_hz / POLLS_PER_SECOND).max(1);
        let timebase = Arc::new(SimTimebase::new(config.timer_freq_hz).with_step(step));
        let board = Board::new(timebase.clone(), config.pins);

        let mut boot = Boot::new(config);
        if let Some(hook) = trace {
            boot = boot.with_trace_hook(hook);
        }
        let system = boot.start(board)?;

        Ok(Self {
            system,
            epoch: timebase.peek(),
            timebase,
            presses: VecDeque::new(),
        })
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn board(&self) -> &Board {
        self.system.board()
    }

    /// Queue a press; presses run in time order.
    pub fn schedule_press(&mut self, press: ButtonPress) {
        let index = self
            .presses
            .iter()
            .position(|queued| queued.at_ms > press.at_ms)
            .unwrap_or(self.presses.len());
        self.presses.insert(index, press);
    }

    /// Simulated milliseconds since boot, by the system timer
    pub fn now_ms(&self) -> u64 {
        let elapsed = self.timebase.peek().wrapping_sub(self.epoch);
        elapsed.saturating_mul(1_000) / self.timebase_hz()
    }

    /// Run `duration_ms` worth of kernel ticks.
    pub fn run_for(&mut self, duration_ms: u64) -> RunSummary {
        let ticks = self.system.kernel().config().ms_to_ticks(duration_ms);
        let start = self.system.kernel().tick_count();
        let mut halted = self.system.halted();

        while halted.is_none() && self.system.kernel().tick_count().wrapping_sub(start) < ticks {
            let next = self.system.kernel().tick_count().wrapping_add(1);
            self.advance_to(self.counter_offset(next));

            let now_ms = self.tick_to_ms(next);
            while let Some(press) = self.presses.front().copied() {
                if press.at_ms > now_ms {
                    break;
                }
                self.presses.pop_front();
                log::debug!("press {} at {} ms", press, now_ms);
                if let Err(err) = self.board().press(press.button) {
                    log::error!("press {} failed: {}", press, err);
                }
            }

            if let Err(reason) = self.system.step() {
                halted = Some(reason);
            }
        }

        let board = self.board();
        RunSummary {
            ticks: self.system.kernel().tick_count().wrapping_sub(start),
            red_toggles: board.led_toggles(Led::Red),
            green_toggles: board.led_toggles(Led::Green),
            blue_toggles: board.led_toggles(Led::Blue),
            halted,
        }
    }

    fn timebase_hz(&self) -> u64 {
        self.timebase.frequency_hz().max(1)
    }

    fn tick_hz(&self) -> u64 {
        u64::from(self.system.kernel().config().tick_rate_hz.max(1))
    }

    /// Timer counts from the epoch to the start of kernel tick `tick`.
    fn counter_offset(&self, tick: u64) -> u64 {
        scale(tick, self.timebase_hz(), self.tick_hz())
    }

    fn tick_to_ms(&self, tick: u64) -> u64 {
        scale(tick, 1_000, self.tick_hz())
    }

    /// Move the timer forward to `offset` ticks past the epoch, never back.
    fn advance_to(&self, offset: u64) {
        let target = self.epoch.wrapping_add(offset);
        let behind = target.wrapping_sub(self.timebase.peek());
        if behind > 0 && behind < u64::MAX / 2 {
            self.timebase.advance(behind);
        }
    }
}

/// `value * num / den` without intermediate overflow, saturating the result.
fn scale(value: u64, num: u64, den: u64) -> u64 {
    let scaled = u128::from(value) * u128::from(num) / u128::from(den.max(1));
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_parses_button_and_time() {
        assert_eq!(
            "a@250".parse::<ButtonPress>(),
            Ok(ButtonPress {
                button: Button::One,
                at_ms: 250
            })
        );
        assert_eq!(
            "B@0".parse::<ButtonPress>().map(|p| p.button),
            Ok(Button::Two)
        );
        assert!("c@10".parse::<ButtonPress>().is_err());
        assert!("a10".parse::<ButtonPress>().is_err());
        assert!("a@soon".parse::<ButtonPress>().is_err());
    }

    #[test]
    fn presses_are_kept_in_time_order() {
        let mut machine = Machine::boot(DemoConfig::default(), None).unwrap();
        for press in ["b@300", "a@100", "a@200"] {
            machine.schedule_press(press.parse().unwrap());
        }
        let order: Vec<String> = machine.presses.iter().map(|p| p.to_string()).collect();
        assert_eq!(order, ["a@100", "a@200", "b@300"]);
    }

    #[test]
    fn time_conversions_saturate_on_huge_values() {
        let machine = Machine::boot(DemoConfig::default(), None).unwrap();
        assert_eq!(machine.tick_to_ms(u64::MAX), u64::MAX);
        assert_eq!(machine.counter_offset(u64::MAX), u64::MAX);
        assert_eq!(machine.counter_offset(1_000), 32_768);
        assert_eq!(scale(u64::MAX, 1, 1_000), u64::MAX / 1_000);
    }

    #[test]
    fn huge_duration_runs_until_halt_without_overflow() {
        // A storm threshold of zero faults on the first dispatch, which ends
        // an otherwise effectively endless run.
        let config = DemoConfig::builder()
            .dispatch(irq::DispatchConfig::default().with_storm_threshold(0))
            .build();
        let mut machine = Machine::boot(config, None).unwrap();
        machine.schedule_press("a@2".parse().unwrap());

        let summary = machine.run_for(u64::MAX / 10);
        assert!(matches!(
            summary.halted,
            Some(HaltReason::InterruptStorm(_))
        ));
        assert!(summary.ticks <= 2);
    }
}
