//! Small preemptive-priority kernel
//!
//! Provides the scheduling services an interrupt-driven application needs
//! around its handlers: prioritised tasks that suspend by delaying, periodic
//! and one-shot software timers, and bounded queues that interrupt handlers
//! may also use. Time advances in ticks driven by the caller.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod config;
pub mod kernel;
pub mod queue;
pub(crate) mod scheduler;
pub mod sync;
pub mod task;
pub mod timer;
pub mod trace;

pub use config::{ms_to_ticks, KernelConfig, KernelConfigBuilder};
pub use kernel::{Kernel, KernelError, KernelState, TickReport};
pub use queue::{MessageQueue, QueueError};
pub use task::{TaskAction, TaskBody, TaskConfig, TaskContext, TaskId, TaskInfo, TaskPriority, TaskState};
pub use timer::{SoftwareTimer, TimerCallback, TimerConfig};
pub use trace::{KernelEvent, TraceHook};
