//! Interrupt dispatcher
//!
//! Lines are registered once, before the dispatcher is shared, with a handler
//! whose kind matches the line's [`Discipline`]:
//!
//! - vectored handlers receive a [`VectoredEntry`] token and get nothing else
//!   until they call [`VectoredEntry::save_context`]. The returned
//!   [`ContextGuard`] is what hands out the [`IsrContext`], so a vectored
//!   handler cannot reach the busy wait (and thus cannot be preempted)
//!   without having saved the interrupt CSRs first.
//! - non-vectored handlers are entered through the common entry, which does
//!   the save and restore around the handler body.
//!
//! [`InterruptDispatch::service`] models the hardware arbitration loop: the
//! highest-level asserted line above the current level wins, ties broken by
//! priority and then irq number.

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::cell::Cell;
use core::ops::Deref;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use hal::interrupt::{
    Discipline, EclicConfig, InterruptController, InterruptLine, InterruptPriority,
    InterruptSource, RegistrationError,
};
use hal::timer::Timebase;
use hal::{HalError, HalResult};

use crate::busy_wait::BusyWaitTimer;
use crate::context::{Cpu, ExecutionContext, SavedContext};

/// Base of the vector table; line `n` enters at `VECTOR_TABLE_BASE + 4 * n`
pub const VECTOR_TABLE_BASE: usize = 0x8000_0000;
/// Address of the common entry used by non-vectored lines
pub const COMMON_ENTRY: usize = 0x8000_1000;

/// Entry address the core jumps to for `line`.
pub const fn entry_address(line: &InterruptLine) -> usize {
    match line.discipline {
        Discipline::Vectored => VECTOR_TABLE_BASE + 4 * line.irq as usize,
        Discipline::NonVectored => COMMON_ENTRY,
    }
}

pub type VectoredHandler = Box<dyn for<'a> Fn(VectoredEntry<'a>) + Send + Sync>;
pub type NonVectoredHandler = Box<dyn for<'a, 'b> Fn(&'a IsrContext<'b>) + Send + Sync>;

/// Interrupt service routine, tagged with the entry discipline it expects.
pub enum Handler {
    Vectored(VectoredHandler),
    NonVectored(NonVectoredHandler),
}

impl Handler {
    pub fn vectored<F>(f: F) -> Self
    where
        F: for<'a> Fn(VectoredEntry<'a>) + Send + Sync + 'static,
    {
        Self::Vectored(Box::new(f))
    }

    pub fn non_vectored<F>(f: F) -> Self
    where
        F: for<'a, 'b> Fn(&'a IsrContext<'b>) + Send + Sync + 'static,
    {
        Self::NonVectored(Box::new(f))
    }

    pub fn discipline(&self) -> Discipline {
        match self {
            Self::Vectored(_) => Discipline::Vectored,
            Self::NonVectored(_) => Discipline::NonVectored,
        }
    }
}

/// Dispatch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// A line kept re-asserting after its handler returned
    #[error("interrupt storm on irq {irq}: {dispatches} consecutive dispatches")]
    InterruptStorm { irq: u16, dispatches: u32 },
}

#[cfg(feature = "defmt")]
impl defmt::Format for DispatchError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InterruptStorm { irq, dispatches } => defmt::write!(
                fmt,
                "InterruptStorm {{ irq: {}, dispatches: {} }}",
                irq,
                dispatches
            ),
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub eclic: EclicConfig,
    /// Back-to-back dispatches of one line tolerated in a single service pass
    pub storm_threshold: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            eclic: EclicConfig::default(),
            storm_threshold: 16,
        }
    }
}

impl DispatchConfig {
    pub fn with_eclic(mut self, eclic: EclicConfig) -> Self {
        self.eclic = eclic;
        self
    }

    pub fn with_storm_threshold(mut self, threshold: u32) -> Self {
        self.storm_threshold = threshold;
        self
    }
}

struct Slot {
    line: InterruptLine,
    source: Arc<dyn InterruptSource>,
    handler: Handler,
    enabled: AtomicBool,
}

/// Interrupt dispatcher for one hart.
pub struct InterruptDispatch {
    config: DispatchConfig,
    cpu: Arc<Cpu>,
    timebase: Arc<dyn Timebase>,
    slots: Vec<Option<Slot>>,
    fault: Mutex<Cell<Option<DispatchError>>>,
}

impl InterruptDispatch {
    pub fn new(cpu: Arc<Cpu>, timebase: Arc<dyn Timebase>, config: DispatchConfig) -> Self {
        let mut slots = Vec::with_capacity(usize::from(config.eclic.num_interrupts));
        slots.resize_with(usize::from(config.eclic.num_interrupts), || None);
        Self {
            config,
            cpu,
            timebase,
            slots,
            fault: Mutex::new(Cell::new(None)),
        }
    }

    /// Install `handler` for `line` and enable the line.
    pub fn register(
        &mut self,
        line: InterruptLine,
        source: Arc<dyn InterruptSource>,
        handler: Handler,
    ) -> Result<(), RegistrationError> {
        self.config.eclic.validate(&line)?;
        if handler.discipline() != line.discipline {
            return Err(RegistrationError::DisciplineMismatch {
                irq: line.irq,
                line: line.discipline,
            });
        }

        let slot = &mut self.slots[usize::from(line.irq)];
        if slot.is_some() {
            return Err(RegistrationError::SlotOccupied { irq: line.irq });
        }

        log::debug!(
            "irq {} registered: {} mode, {:?}, level {}, priority {}",
            line.irq,
            line.discipline,
            line.trigger,
            line.level,
            line.priority
        );
        *slot = Some(Slot {
            line,
            source,
            handler,
            enabled: AtomicBool::new(true),
        });
        Ok(())
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn line(&self, irq: u16) -> Option<&InterruptLine> {
        self.slot(irq).map(|slot| &slot.line)
    }

    pub fn is_registered(&self, irq: u16) -> bool {
        self.slot(irq).is_some()
    }

    /// Sticky dispatch fault, if one was detected
    pub fn fault(&self) -> Option<DispatchError> {
        critical_section::with(|cs| self.fault.borrow(cs).get())
    }

    /// Run every pending line that can currently preempt, highest first.
    ///
    /// Returns the number of handlers run. Called from thread mode this
    /// models the core taking interrupts between instructions; called from
    /// inside a handler it models nested preemption.
    pub fn service(&self) -> Result<u32, DispatchError> {
        if let Some(fault) = self.fault() {
            return Err(fault);
        }

        let mut dispatched = 0;
        let mut streak: Option<(u16, u32)> = None;

        while let Some(slot) = self.next_pending() {
            let irq = slot.line.irq;
            let count = match streak {
                Some((last, n)) if last == irq => n + 1,
                _ => 1,
            };
            if count > self.config.storm_threshold {
                let fault = DispatchError::InterruptStorm {
                    irq,
                    dispatches: count - 1,
                };
                log::error!("{}", fault);
                critical_section::with(|cs| self.fault.borrow(cs).set(Some(fault)));
                return Err(fault);
            }
            streak = Some((irq, count));

            self.dispatch(slot);
            dispatched += 1;

            if let Some(fault) = self.fault() {
                return Err(fault);
            }
        }

        Ok(dispatched)
    }

    fn slot(&self, irq: u16) -> Option<&Slot> {
        self.slots.get(usize::from(irq)).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, irq: u16) -> HalResult<&mut Slot> {
        self.slots
            .get_mut(usize::from(irq))
            .and_then(Option::as_mut)
            .ok_or(HalError::InvalidParameter)
    }

    fn next_pending(&self) -> Option<&Slot> {
        if !self.cpu.interrupts_enabled() {
            return None;
        }
        let current = self.cpu.level();
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.enabled.load(Ordering::SeqCst))
            .filter(|slot| slot.line.level > current)
            .filter(|slot| slot.source.is_asserted())
            .max_by_key(|slot| (slot.line.level, slot.line.priority, slot.line.irq))
    }

    fn dispatch(&self, slot: &Slot) {
        let line = &slot.line;
        self.cpu.trap_enter(line.irq, line.level, entry_address(line));
        log::trace!(
            "irq {} taken at level {} (depth {})",
            line.irq,
            line.level,
            self.cpu.depth()
        );

        match &slot.handler {
            Handler::Vectored(handler) => handler(VectoredEntry {
                dispatch: self,
                line,
            }),
            Handler::NonVectored(handler) => {
                let _saved = SavedContext::save(&self.cpu);
                handler(&IsrContext {
                    dispatch: self,
                    line,
                });
            }
        }

        let resumed = self.cpu.mret();
        log::trace!("irq {} returned to {:#x}", line.irq, resumed);
    }
}

impl InterruptController for InterruptDispatch {
    fn enable_interrupt(&mut self, irq: u16) -> HalResult<()> {
        self.slot_mut(irq)?.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_interrupt(&mut self, irq: u16) -> HalResult<()> {
        self.slot_mut(irq)?.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_priority(&mut self, irq: u16, priority: InterruptPriority) -> HalResult<()> {
        if priority > self.config.eclic.max_priority() {
            return Err(HalError::InvalidParameter);
        }
        self.slot_mut(irq)?.line.priority = priority;
        Ok(())
    }

    fn is_pending(&self, irq: u16) -> bool {
        self.slot(irq).is_some_and(|slot| slot.source.is_asserted())
    }

    fn clear_pending(&mut self, irq: u16) -> HalResult<()> {
        self.slot_mut(irq)?.source.acknowledge()
    }
}

/// Entry token handed to a vectored handler.
///
/// The only useful thing to do with it is
/// [`save_context`](VectoredEntry::save_context).
#[must_use = "a vectored handler must save the interrupt context before doing work"]
pub struct VectoredEntry<'a> {
    dispatch: &'a InterruptDispatch,
    line: &'a InterruptLine,
}

impl<'a> VectoredEntry<'a> {
    pub fn line(&self) -> &InterruptLine {
        self.line
    }

    /// Save the interrupt CSRs and re-enable nesting.
    ///
    /// The context is restored, with interrupts disabled, when the guard
    /// drops.
    pub fn save_context(self) -> ContextGuard<'a> {
        ContextGuard {
            saved: SavedContext::save(&self.dispatch.cpu),
            isr: IsrContext {
                dispatch: self.dispatch,
                line: self.line,
            },
        }
    }
}

/// Saved interrupt context of a vectored handler; derefs to its
/// [`IsrContext`].
pub struct ContextGuard<'a> {
    saved: SavedContext<'a>,
    isr: IsrContext<'a>,
}

impl ContextGuard<'_> {
    pub fn saved(&self) -> &ExecutionContext {
        self.saved.saved()
    }
}

impl<'a> Deref for ContextGuard<'a> {
    type Target = IsrContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.isr
    }
}

/// What a handler body may do while its context is saved.
pub struct IsrContext<'a> {
    dispatch: &'a InterruptDispatch,
    line: &'a InterruptLine,
}

impl IsrContext<'_> {
    pub fn line(&self) -> &InterruptLine {
        self.line
    }

    pub fn irq(&self) -> u16 {
        self.line.irq
    }

    pub fn cpu(&self) -> &Cpu {
        &self.dispatch.cpu
    }

    /// Traps currently open, this one included
    pub fn nesting_depth(&self) -> u32 {
        self.dispatch.cpu.depth()
    }

    /// Let any higher-level pending line run now.
    pub fn preemption_point(&self) {
        // A storm is recorded as a sticky fault and surfaces from the
        // outermost service call.
        let _ = self.dispatch.service();
    }

    /// Busy-wait `seconds` on the system timer, preemptible by higher levels.
    pub fn wait_seconds(&self, seconds: u32) -> u64 {
        BusyWaitTimer::new(&*self.dispatch.timebase)
            .wait_seconds_with(seconds, || self.preemption_point())
    }
}
