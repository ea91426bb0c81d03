//! Hardware Abstraction Layer (HAL) for ECLIC-based RISC-V boards
//!
//! This crate provides the platform surface the interrupt and task layers are
//! written against: the GPIO register model shared by interrupt handlers and
//! tasks, interrupt-line descriptors together with the controller trait, and
//! the free-running timebase used for busy waiting.
//!
//! Everything here is a thin boundary. Register operations take effect
//! immediately; there is no batching or caching layer.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
pub mod gpio;
pub mod interrupt;
pub mod timer;

// Re-export commonly used types
pub use error::{HalError, HalResult};
pub use gpio::{Edge, GpioBank, GpioInterruptSource, Level, PinMask};
pub use interrupt::{
    Discipline, EclicConfig, InterruptController, InterruptLine, InterruptSource,
    RegistrationError, SoftwareSource, Trigger,
};
#[cfg(feature = "std")]
pub use timer::MonotonicTimebase;
pub use timer::{SimTimebase, Timebase};
