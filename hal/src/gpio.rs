//! GPIO (General Purpose Input/Output) register model
//!
//! [`GpioBank`] mirrors a 32-pin GPIO peripheral: every register is a 32-bit
//! word and every operation takes a [`PinMask`] selecting the affected bits.
//! The bank is shared by interrupt handlers and tasks through a plain shared
//! reference; there is no lock.
//!
//! # Shared-state hazard
//!
//! [`GpioBank::toggle`] is a single atomic `fetch_xor` on the output register,
//! so concurrent toggles of *different* bits never lose each other. What is
//! not protected is ordering: two sources toggling the *same* bit race, and
//! the final level depends on interleaving. Callers that need to reason about
//! concurrent activity should use [`GpioBank::toggle_count`], which counts
//! toggles per pin, rather than the final output level.

use alloc::sync::Arc;
use core::ops::BitOr;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{HalError, HalResult};
use crate::interrupt::InterruptSource;

/// Number of pins in one bank.
pub const PINS_PER_BANK: u32 = 32;

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Low level (0V)
    Low,
    /// High level (VCC)
    High,
}

impl Level {
    fn from_bit(bit: bool) -> Self {
        if bit {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Interrupt trigger edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Rising edge
    Rising,
    /// Falling edge
    Falling,
}

/// Bit mask selecting one or more pins of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinMask(u32);

impl PinMask {
    /// Mask with no pins selected
    pub const NONE: Self = Self(0);

    /// Mask with every pin selected
    pub const ALL: Self = Self(u32::MAX);

    /// Mask for a single pin offset. Offsets outside the bank select nothing.
    pub const fn pin(offset: u32) -> Self {
        match 1u32.checked_shl(offset) {
            Some(bit) => Self(bit),
            None => Self::NONE,
        }
    }

    /// Mask from raw register bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw register bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every pin of `other` is part of this mask
    pub const fn contains(self, other: PinMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Iterate over the pin offsets selected by this mask.
    pub fn offsets(self) -> impl Iterator<Item = u32> {
        (0..PINS_PER_BANK).filter(move |offset| self.0 & (1 << offset) != 0)
    }
}

impl BitOr for PinMask {
    type Output = PinMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        PinMask(self.0 | rhs.0)
    }
}

fn check_offset(offset: u32) -> HalResult<()> {
    if offset >= PINS_PER_BANK {
        Err(HalError::InvalidPin(offset))
    } else {
        Ok(())
    }
}

/// Register-level model of one GPIO bank.
pub struct GpioBank {
    input_en: AtomicU32,
    output_en: AtomicU32,
    pull_up: AtomicU32,
    output: AtomicU32,
    input: AtomicU32,
    rise_ie: AtomicU32,
    rise_ip: AtomicU32,
    fall_ie: AtomicU32,
    fall_ip: AtomicU32,
    toggles: [AtomicU32; PINS_PER_BANK as usize],
}

impl GpioBank {
    /// Create a bank in its reset state: every pin disabled, all registers zero.
    pub const fn new() -> Self {
        Self {
            input_en: AtomicU32::new(0),
            output_en: AtomicU32::new(0),
            pull_up: AtomicU32::new(0),
            output: AtomicU32::new(0),
            input: AtomicU32::new(0),
            rise_ie: AtomicU32::new(0),
            rise_ip: AtomicU32::new(0),
            fall_ie: AtomicU32::new(0),
            fall_ip: AtomicU32::new(0),
            toggles: [const { AtomicU32::new(0) }; PINS_PER_BANK as usize],
        }
    }

    /// Enable the selected pins as inputs
    pub fn enable_input(&self, mask: PinMask) {
        self.output_en.fetch_and(!mask.bits(), Ordering::SeqCst);
        self.input_en.fetch_or(mask.bits(), Ordering::SeqCst);
    }

    /// Enable the selected pins as outputs
    pub fn enable_output(&self, mask: PinMask) {
        self.input_en.fetch_and(!mask.bits(), Ordering::SeqCst);
        self.output_en.fetch_or(mask.bits(), Ordering::SeqCst);
    }

    /// Set the pull-up enable bits of the selected pins to `value`.
    pub fn set_pull_up(&self, mask: PinMask, value: u32) {
        write_masked(&self.pull_up, mask, value);
    }

    /// Pull-up enable register.
    pub fn pull_up(&self) -> PinMask {
        PinMask(self.pull_up.load(Ordering::SeqCst))
    }

    /// Write `value` into the output bits selected by `mask`.
    pub fn write(&self, mask: PinMask, value: u32) {
        write_masked(&self.output, mask, value);
    }

    /// Read the selected bits: input pins report the sampled input level,
    /// output pins report the driven level.
    pub fn read(&self, mask: PinMask) -> u32 {
        let input_en = self.input_en.load(Ordering::SeqCst);
        let input = self.input.load(Ordering::SeqCst) & input_en;
        let output = self.output.load(Ordering::SeqCst) & !input_en;
        (input | output) & mask.bits()
    }

    /// Invert the output bits selected by `mask`, returning the previous
    /// output bits under the mask.
    ///
    /// Each call is one atomic read-modify-write on the output register and
    /// bumps the per-pin toggle counters.
    pub fn toggle(&self, mask: PinMask) -> u32 {
        let previous = self.output.fetch_xor(mask.bits(), Ordering::SeqCst);
        for offset in mask.offsets() {
            self.toggles[offset as usize].fetch_add(1, Ordering::Relaxed);
        }
        previous & mask.bits()
    }

    /// Number of toggles applied to pin `offset` since reset.
    pub fn toggle_count(&self, offset: u32) -> u32 {
        self.toggles
            .get(offset as usize)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Enable edge interrupts for the selected pins
    pub fn enable_interrupt(&self, mask: PinMask, edge: Edge) {
        self.enable_register(edge).fetch_or(mask.bits(), Ordering::SeqCst);
    }

    /// Disable edge interrupts for the selected pins
    pub fn disable_interrupt(&self, mask: PinMask, edge: Edge) {
        self.enable_register(edge)
            .fetch_and(!mask.bits(), Ordering::SeqCst);
    }

    /// Clear the pending flag of pin `offset` for `edge`.
    ///
    /// Pending flags are sticky: they stay set until software writes a one
    /// to the pending register, regardless of the current input level.
    pub fn clear_interrupt(&self, offset: u32, edge: Edge) -> HalResult<()> {
        check_offset(offset)?;
        self.pending_register(edge)
            .fetch_and(!(1 << offset), Ordering::SeqCst);
        Ok(())
    }

    /// Check the pending flag of pin `offset` for `edge`.
    pub fn interrupt_pending(&self, offset: u32, edge: Edge) -> bool {
        offset < PINS_PER_BANK
            && self.pending_register(edge).load(Ordering::SeqCst) & (1 << offset) != 0
    }

    /// Full pending register for `edge`.
    pub fn pending(&self, edge: Edge) -> PinMask {
        PinMask(self.pending_register(edge).load(Ordering::SeqCst))
    }

    /// Drive the external level seen by input pin `offset`.
    ///
    /// This is the stimulus side of the model: a low-to-high transition on a
    /// pin with a rising-edge enable latches its rising pending flag, and
    /// symmetrically for falling edges.
    pub fn drive_input(&self, offset: u32, level: Level) -> HalResult<()> {
        check_offset(offset)?;
        let bit = 1 << offset;
        let previous = match level {
            Level::High => self.input.fetch_or(bit, Ordering::SeqCst),
            Level::Low => self.input.fetch_and(!bit, Ordering::SeqCst),
        };
        let was_high = previous & bit != 0;

        let edge = match (was_high, level) {
            (false, Level::High) => Edge::Rising,
            (true, Level::Low) => Edge::Falling,
            _ => return Ok(()),
        };

        if self.enable_register(edge).load(Ordering::SeqCst) & bit != 0 {
            self.pending_register(edge).fetch_or(bit, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Borrow a single pin of the bank.
    pub fn pin(&self, offset: u32) -> HalResult<BankPin<'_>> {
        check_offset(offset)?;
        Ok(BankPin { bank: self, offset })
    }

    fn enable_register(&self, edge: Edge) -> &AtomicU32 {
        match edge {
            Edge::Rising => &self.rise_ie,
            Edge::Falling => &self.fall_ie,
        }
    }

    fn pending_register(&self, edge: Edge) -> &AtomicU32 {
        match edge {
            Edge::Rising => &self.rise_ip,
            Edge::Falling => &self.fall_ip,
        }
    }

    fn is_output(&self, offset: u32) -> bool {
        self.output_en.load(Ordering::SeqCst) & (1 << offset) != 0
    }
}

impl Default for GpioBank {
    fn default() -> Self {
        Self::new()
    }
}

fn write_masked(register: &AtomicU32, mask: PinMask, value: u32) {
    let bits = mask.bits();
    // fetch_update retries until the masked write lands atomically.
    let _ = register.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some((current & !bits) | (value & bits))
    });
}

/// GPIO pin trait (object-safe)
pub trait GpioPin {
    /// Read current level
    fn read(&self) -> HalResult<Level>;

    /// Write level (for output pins)
    fn write(&mut self, level: Level) -> HalResult<()>;

    /// Toggle output
    fn toggle(&mut self) -> HalResult<()> {
        let current = self.read()?;
        let new_level = match current {
            Level::Low => Level::High,
            Level::High => Level::Low,
        };
        self.write(new_level)
    }

    /// Get pin number
    fn pin_number(&self) -> u32;
}

/// GPIO pin with interrupt support
pub trait GpioPinInterrupt: GpioPin {
    /// Enable interrupt on edge
    fn enable_interrupt(&mut self, edge: Edge) -> HalResult<()>;

    /// Disable interrupt
    fn disable_interrupt(&mut self, edge: Edge) -> HalResult<()>;

    /// Clear pending interrupt
    fn clear_interrupt(&mut self, edge: Edge) -> HalResult<()>;

    /// Check if interrupt is pending
    fn is_interrupt_pending(&self, edge: Edge) -> bool;
}

/// One pin of a [`GpioBank`].
pub struct BankPin<'a> {
    bank: &'a GpioBank,
    offset: u32,
}

impl GpioPin for BankPin<'_> {
    fn read(&self) -> HalResult<Level> {
        Ok(Level::from_bit(
            self.bank.read(PinMask::pin(self.offset)) != 0,
        ))
    }

    fn write(&mut self, level: Level) -> HalResult<()> {
        if !self.bank.is_output(self.offset) {
            return Err(HalError::WrongDirection(self.offset));
        }
        let value = match level {
            Level::Low => 0,
            Level::High => u32::MAX,
        };
        self.bank.write(PinMask::pin(self.offset), value);
        Ok(())
    }

    fn toggle(&mut self) -> HalResult<()> {
        if !self.bank.is_output(self.offset) {
            return Err(HalError::WrongDirection(self.offset));
        }
        self.bank.toggle(PinMask::pin(self.offset));
        Ok(())
    }

    fn pin_number(&self) -> u32 {
        self.offset
    }
}

impl GpioPinInterrupt for BankPin<'_> {
    fn enable_interrupt(&mut self, edge: Edge) -> HalResult<()> {
        self.bank.enable_interrupt(PinMask::pin(self.offset), edge);
        Ok(())
    }

    fn disable_interrupt(&mut self, edge: Edge) -> HalResult<()> {
        self.bank.disable_interrupt(PinMask::pin(self.offset), edge);
        Ok(())
    }

    fn clear_interrupt(&mut self, edge: Edge) -> HalResult<()> {
        self.bank.clear_interrupt(self.offset, edge)
    }

    fn is_interrupt_pending(&self, edge: Edge) -> bool {
        self.bank.interrupt_pending(self.offset, edge)
    }
}

/// Interrupt request wire from one GPIO pin's pending flag to the
/// interrupt controller.
///
/// The request stays asserted for as long as the pin's pending flag is set,
/// so a handler that forgets to clear it is re-entered immediately.
pub struct GpioInterruptSource {
    bank: Arc<GpioBank>,
    offset: u32,
    edge: Edge,
}

impl GpioInterruptSource {
    pub fn new(bank: Arc<GpioBank>, offset: u32, edge: Edge) -> HalResult<Self> {
        check_offset(offset)?;
        Ok(Self { bank, offset, edge })
    }
}

impl InterruptSource for GpioInterruptSource {
    fn is_asserted(&self) -> bool {
        self.bank.interrupt_pending(self.offset, self.edge)
    }

    fn acknowledge(&self) -> HalResult<()> {
        self.bank.clear_interrupt(self.offset, self.edge)
    }
}
