//! Interrupt layer for ECLIC-based RISC-V cores
//!
//! Two delivery disciplines share one dispatcher. Vectored lines enter their
//! handler directly and must save the interrupt CSRs themselves before
//! nesting can occur; non-vectored lines go through a common entry that does
//! it for them. Either way, the save and the restore are the two ends of one
//! guard object, so they cannot be unbalanced.
//!
//! Handlers that need to wait use the busy-wait timer on the free-running
//! system counter; there is no scheduler delay at interrupt level.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod busy_wait;
pub mod context;
pub mod dispatch;

pub use busy_wait::{wait_seconds, BusyWaitTimer};
pub use context::{Cpu, ExecutionContext, SavedContext};
pub use dispatch::{
    entry_address, ContextGuard, DispatchConfig, DispatchError, Handler, InterruptDispatch,
    IsrContext, VectoredEntry, COMMON_ENTRY, VECTOR_TABLE_BASE,
};
