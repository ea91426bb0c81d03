//! Interrupt CSR model and scoped context save/restore
//!
//! A trap overwrites `mepc`, `mcause` and `msubm`. Before a handler re-enables
//! interrupts it must capture those registers, because a nested trap will
//! overwrite them again; on the way out it must put the captured values back
//! with interrupts disabled so `mret` returns to the interrupted code.
//!
//! [`SavedContext`] ties both halves to one lexical scope: constructing it
//! saves and enables nesting, dropping it disables and restores. The captured
//! [`ExecutionContext`] is neither `Clone` nor `Copy`, so it cannot leak out
//! of that scope and be restored twice.

use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use hal::interrupt::InterruptLevel;

/// `mstatus.MIE`: global machine interrupt enable
pub const MSTATUS_MIE: u32 = 1 << 3;
/// `mstatus.MPIE`: MIE value before the last trap
pub const MSTATUS_MPIE: u32 = 1 << 7;

/// `mcause.INTERRUPT`: trap was caused by an interrupt
pub const MCAUSE_INTERRUPT: u32 = 1 << 31;
/// `mcause.MPIE`: mirror of `mstatus.MPIE`
pub const MCAUSE_MPIE: u32 = 1 << 27;
const MCAUSE_MPIL_SHIFT: u32 = 16;
const MCAUSE_MPIL_MASK: u32 = 0xFF << MCAUSE_MPIL_SHIFT;
const MCAUSE_EXCCODE_MASK: u32 = 0xFFF;

const MSUBM_TYP_SHIFT: u32 = 6;
const MSUBM_PTYP_SHIFT: u32 = 8;
const MSUBM_TYP_MASK: u32 = 0b11 << MSUBM_TYP_SHIFT;
/// `msubm.TYP` value while servicing an interrupt
pub const TRAP_TYPE_INTERRUPT: u32 = 1;

/// Interrupt-relevant state of one hart.
///
/// Fields are atomics so the dispatcher and handler closures can share the
/// hart through `&Cpu`; on a single core only one of them runs at a time.
#[derive(Debug)]
pub struct Cpu {
    pc: AtomicUsize,
    mepc: AtomicUsize,
    mcause: AtomicU32,
    msubm: AtomicU32,
    mstatus: AtomicU32,
    /// `mintstatus.MIL`: level of the interrupt being serviced, 0 in thread mode
    level: AtomicU8,
    depth: AtomicU32,
}

impl Cpu {
    /// Hart in thread mode with interrupts globally enabled.
    pub const fn new() -> Self {
        Self {
            pc: AtomicUsize::new(0),
            mepc: AtomicUsize::new(0),
            mcause: AtomicU32::new(0),
            msubm: AtomicU32::new(0),
            mstatus: AtomicU32::new(MSTATUS_MIE),
            level: AtomicU8::new(0),
            depth: AtomicU32::new(0),
        }
    }

    pub fn pc(&self) -> usize {
        self.pc.load(Ordering::SeqCst)
    }

    /// Move the program counter (thread code calling into new code)
    pub fn set_pc(&self, pc: usize) {
        self.pc.store(pc, Ordering::SeqCst);
    }

    pub fn mepc(&self) -> usize {
        self.mepc.load(Ordering::SeqCst)
    }

    pub fn mcause(&self) -> u32 {
        self.mcause.load(Ordering::SeqCst)
    }

    pub fn msubm(&self) -> u32 {
        self.msubm.load(Ordering::SeqCst)
    }

    pub fn mstatus(&self) -> u32 {
        self.mstatus.load(Ordering::SeqCst)
    }

    /// Level of the interrupt currently being serviced
    pub fn level(&self) -> InterruptLevel {
        self.level.load(Ordering::SeqCst)
    }

    /// Number of traps entered and not yet returned from
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    /// Previous interrupt level recorded in `mcause.MPIL`
    pub fn previous_level(&self) -> InterruptLevel {
        ((self.mcause() & MCAUSE_MPIL_MASK) >> MCAUSE_MPIL_SHIFT) as InterruptLevel
    }

    /// Trap type currently recorded in `msubm.TYP`
    pub fn trap_type(&self) -> u32 {
        (self.msubm() & MSUBM_TYP_MASK) >> MSUBM_TYP_SHIFT
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.mstatus() & MSTATUS_MIE != 0
    }

    pub fn enable_interrupts(&self) {
        self.mstatus.fetch_or(MSTATUS_MIE, Ordering::SeqCst);
    }

    pub fn disable_interrupts(&self) {
        self.mstatus.fetch_and(!MSTATUS_MIE, Ordering::SeqCst);
    }

    /// Hardware side of taking interrupt `irq` at `level`, jumping to `target`.
    pub(crate) fn trap_enter(&self, irq: u16, level: InterruptLevel, target: usize) {
        let mstatus = self.mstatus();
        let mpie = if mstatus & MSTATUS_MIE != 0 {
            MSTATUS_MPIE
        } else {
            0
        };
        self.mstatus
            .store((mstatus & !(MSTATUS_MIE | MSTATUS_MPIE)) | mpie, Ordering::SeqCst);

        let mut cause = MCAUSE_INTERRUPT | (u32::from(irq) & MCAUSE_EXCCODE_MASK);
        cause |= u32::from(self.level()) << MCAUSE_MPIL_SHIFT;
        if mpie != 0 {
            cause |= MCAUSE_MPIE;
        }
        self.mcause.store(cause, Ordering::SeqCst);

        let typ = self.trap_type();
        self.msubm.store(
            (typ << MSUBM_PTYP_SHIFT) | (TRAP_TYPE_INTERRUPT << MSUBM_TYP_SHIFT),
            Ordering::SeqCst,
        );

        self.mepc.store(self.pc(), Ordering::SeqCst);
        self.level.store(level, Ordering::SeqCst);
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.pc.store(target, Ordering::SeqCst);
    }

    /// Hardware side of `mret`. Returns the resumed program counter.
    pub(crate) fn mret(&self) -> usize {
        let mstatus = self.mstatus();
        let mie = if mstatus & MSTATUS_MPIE != 0 {
            MSTATUS_MIE
        } else {
            0
        };
        self.mstatus
            .store((mstatus & !MSTATUS_MIE) | mie | MSTATUS_MPIE, Ordering::SeqCst);

        self.level.store(self.previous_level(), Ordering::SeqCst);
        let ptyp = (self.msubm() >> MSUBM_PTYP_SHIFT) & 0b11;
        self.msubm.store(ptyp << MSUBM_TYP_SHIFT, Ordering::SeqCst);
        self.depth.fetch_sub(1, Ordering::SeqCst);

        let pc = self.mepc();
        self.pc.store(pc, Ordering::SeqCst);
        pc
    }

    fn capture(&self) -> ExecutionContext {
        ExecutionContext {
            mepc: self.mepc(),
            mcause: self.mcause(),
            msubm: self.msubm(),
            depth: self.depth(),
        }
    }

    fn restore(&self, ctx: &ExecutionContext) {
        self.mepc.store(ctx.mepc, Ordering::SeqCst);
        self.mcause.store(ctx.mcause, Ordering::SeqCst);
        self.msubm.store(ctx.msubm, Ordering::SeqCst);
        self.depth.store(ctx.depth, Ordering::SeqCst);
        // mcause.MPIE and mstatus.MPIE are the same bit
        if ctx.mcause & MCAUSE_MPIE != 0 {
            self.mstatus.fetch_or(MSTATUS_MPIE, Ordering::SeqCst);
        } else {
            self.mstatus.fetch_and(!MSTATUS_MPIE, Ordering::SeqCst);
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt CSRs captured on handler entry.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    mepc: usize,
    mcause: u32,
    msubm: u32,
    depth: u32,
}

impl ExecutionContext {
    /// Return address of the interrupted code
    pub fn mepc(&self) -> usize {
        self.mepc
    }

    pub fn mcause(&self) -> u32 {
        self.mcause
    }

    pub fn msubm(&self) -> u32 {
        self.msubm
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Level the interrupted code was running at
    pub fn previous_level(&self) -> InterruptLevel {
        ((self.mcause & MCAUSE_MPIL_MASK) >> MCAUSE_MPIL_SHIFT) as InterruptLevel
    }

    /// Whether `cpu` currently holds exactly this context
    pub fn matches(&self, cpu: &Cpu) -> bool {
        self.mepc == cpu.mepc()
            && self.mcause == cpu.mcause()
            && self.msubm == cpu.msubm()
            && self.depth == cpu.depth()
    }
}

/// Scope guard pairing a context save with its restore.
///
/// Saving captures the CSRs and then enables interrupts so higher levels can
/// preempt. Dropping disables interrupts and writes the captured values back,
/// leaving the hart ready for `mret`.
#[must_use = "dropping the guard immediately restores the context"]
pub struct SavedContext<'a> {
    cpu: &'a Cpu,
    saved: ExecutionContext,
}

impl<'a> SavedContext<'a> {
    pub fn save(cpu: &'a Cpu) -> Self {
        let saved = cpu.capture();
        cpu.enable_interrupts();
        Self { cpu, saved }
    }

    pub fn saved(&self) -> &ExecutionContext {
        &self.saved
    }
}

impl Drop for SavedContext<'_> {
    fn drop(&mut self) {
        self.cpu.disable_interrupts();
        self.cpu.restore(&self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_records_return_address_and_previous_level() {
        let cpu = Cpu::new();
        cpu.set_pc(0x2000_0100);

        cpu.trap_enter(50, 2, 0x1000);
        assert_eq!(cpu.mepc(), 0x2000_0100);
        assert_eq!(cpu.pc(), 0x1000);
        assert_eq!(cpu.level(), 2);
        assert_eq!(cpu.previous_level(), 0);
        assert_eq!(cpu.trap_type(), TRAP_TYPE_INTERRUPT);
        assert!(!cpu.interrupts_enabled());
        assert_eq!(cpu.mcause() & MCAUSE_EXCCODE_MASK, 50);

        assert_eq!(cpu.mret(), 0x2000_0100);
        assert_eq!(cpu.level(), 0);
        assert_eq!(cpu.trap_type(), 0);
        assert_eq!(cpu.depth(), 0);
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    fn nested_trap_without_save_loses_return_address() {
        let cpu = Cpu::new();
        cpu.set_pc(0x100);
        cpu.trap_enter(50, 2, 0x1000);
        cpu.set_pc(0x1040);
        cpu.enable_interrupts();
        cpu.trap_enter(49, 3, 0x2000);
        cpu.mret();

        // The outer mepc is gone: returning now would land back in the handler.
        assert_eq!(cpu.mepc(), 0x1040);
    }

    #[test]
    fn saved_context_restores_after_nested_trap() {
        let cpu = Cpu::new();
        cpu.set_pc(0x100);
        cpu.trap_enter(50, 2, 0x1000);

        {
            let guard = SavedContext::save(&cpu);
            assert!(cpu.interrupts_enabled());
            cpu.set_pc(0x1040);
            cpu.trap_enter(49, 3, 0x2000);
            assert!(!guard.saved().matches(&cpu));
            cpu.mret();
        }

        assert!(!cpu.interrupts_enabled());
        assert_eq!(cpu.mepc(), 0x100);
        assert_eq!(cpu.previous_level(), 0);
        assert_eq!(cpu.mret(), 0x100);
        assert_eq!(cpu.level(), 0);
        assert_eq!(cpu.depth(), 0);
    }
}
