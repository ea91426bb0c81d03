//! Two-button interrupt demo
//!
//! Button 1 raises a vectored interrupt at level 3 and toggles the green
//! LED; button 2 raises a non-vectored interrupt at level 2 and toggles the
//! blue LED. Each handler busy-waits for a second, so a press of button 1
//! during button 2's wait nests on top of it. Meanwhile two tasks report
//! liveness and a 1 s software timer blinks the red LED.
//!
//! [`boot`] brings the system up in a fixed order; [`sim::Machine`] runs it
//! deterministically on a host.

pub mod board;
pub mod boot;
pub mod config;
pub mod handlers;
pub mod sim;
pub mod tasks;
pub mod trace;

pub use board::{board_gpio_init, Board, Button};
pub use boot::{halt, run, Boot, BootState, HaltReason, System};
pub use config::{DemoConfig, DemoConfigBuilder, PinMap, TaskSpec};
pub use handlers::ButtonHandlers;
pub use sim::{ButtonPress, Machine, RunSummary};
pub use trace::{DemoEvent, Led, TraceHook, TraceRecorder, Tracer};
