//! Interrupt controller abstraction
//!
//! Describes ECLIC-style interrupt lines: each line has a trigger mode, a
//! delivery [`Discipline`], and a control byte split into a preemption
//! *level* and a same-level *priority*. The split is fixed by
//! [`EclicConfig`] and checked when a line is registered.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{HalError, HalResult};

/// Interrupt priority within one level (higher wins arbitration)
pub type InterruptPriority = u8;

/// Interrupt preemption level (higher preempts lower)
pub type InterruptLevel = u8;

/// How the hardware dispatches a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// The core jumps straight to the line's own handler. The handler must
    /// save and restore the interrupt CSRs itself before it can allow
    /// nesting.
    Vectored,
    /// The core enters the common interrupt entry owned by the scheduler
    /// port, which brackets the handler body with the context save and
    /// restore.
    NonVectored,
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vectored => write!(f, "vector"),
            Self::NonVectored => write!(f, "non_vector"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Discipline {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Vectored => defmt::write!(fmt, "Vectored"),
            Self::NonVectored => defmt::write!(fmt, "NonVectored"),
        }
    }
}

/// Line trigger mode as seen by the interrupt controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Level,
    RisingEdge,
    FallingEdge,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level => write!(f, "level triggered"),
            Self::RisingEdge => write!(f, "rising edge"),
            Self::FallingEdge => write!(f, "falling edge"),
        }
    }
}

/// Static description of one hardware interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptLine {
    pub irq: u16,
    pub trigger: Trigger,
    pub discipline: Discipline,
    pub level: InterruptLevel,
    pub priority: InterruptPriority,
}

impl InterruptLine {
    /// Rising-edge vectored line
    pub const fn vectored(irq: u16, level: InterruptLevel, priority: InterruptPriority) -> Self {
        Self {
            irq,
            trigger: Trigger::RisingEdge,
            discipline: Discipline::Vectored,
            level,
            priority,
        }
    }

    /// Rising-edge non-vectored line
    pub const fn non_vectored(
        irq: u16,
        level: InterruptLevel,
        priority: InterruptPriority,
    ) -> Self {
        Self {
            irq,
            trigger: Trigger::RisingEdge,
            discipline: Discipline::NonVectored,
            level,
            priority,
        }
    }

    pub const fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Geometry of the interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EclicConfig {
    /// Number of interrupt lines (valid irq numbers are `0..num_interrupts`)
    pub num_interrupts: u16,
    /// Implemented bits of the per-line control byte
    pub ctl_bits: u8,
    /// How many of the control bits encode the level; the rest encode priority
    pub level_bits: u8,
}

impl Default for EclicConfig {
    fn default() -> Self {
        Self {
            num_interrupts: 87,
            ctl_bits: 3,
            level_bits: 2,
        }
    }
}

impl EclicConfig {
    /// Highest encodable level
    pub const fn max_level(&self) -> InterruptLevel {
        ((1u16 << self.level_bits) - 1) as InterruptLevel
    }

    /// Highest encodable priority within a level
    pub const fn max_priority(&self) -> InterruptPriority {
        let bits = self.ctl_bits.saturating_sub(self.level_bits);
        ((1u16 << bits) - 1) as InterruptPriority
    }

    /// Check that `line` can be encoded by this controller.
    pub fn validate(&self, line: &InterruptLine) -> Result<(), RegistrationError> {
        if line.irq >= self.num_interrupts {
            return Err(RegistrationError::IrqOutOfRange {
                irq: line.irq,
                max: self.num_interrupts.saturating_sub(1),
            });
        }
        if line.level > self.max_level() {
            return Err(RegistrationError::InvalidLevel {
                irq: line.irq,
                level: line.level,
                max: self.max_level(),
            });
        }
        if line.priority > self.max_priority() {
            return Err(RegistrationError::InvalidPriority {
                irq: line.irq,
                priority: line.priority,
                max: self.max_priority(),
            });
        }
        Ok(())
    }
}

/// Reasons an interrupt line cannot be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// Irq number beyond the controller's line count
    IrqOutOfRange { irq: u16, max: u16 },
    /// A handler is already installed in this vector slot
    SlotOccupied { irq: u16 },
    /// Level not encodable with the configured level bits
    InvalidLevel { irq: u16, level: u8, max: u8 },
    /// Priority not encodable with the remaining control bits
    InvalidPriority { irq: u16, priority: u8, max: u8 },
    /// Handler kind does not match the line's delivery discipline
    DisciplineMismatch { irq: u16, line: Discipline },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IrqOutOfRange { irq, max } => {
                write!(f, "irq {} out of range (max {})", irq, max)
            }
            Self::SlotOccupied { irq } => write!(f, "irq {} already has a handler", irq),
            Self::InvalidLevel { irq, level, max } => {
                write!(f, "irq {}: level {} exceeds max level {}", irq, level, max)
            }
            Self::InvalidPriority { irq, priority, max } => {
                write!(
                    f,
                    "irq {}: priority {} exceeds max priority {}",
                    irq, priority, max
                )
            }
            Self::DisciplineMismatch { irq, line } => {
                write!(f, "irq {}: handler does not match {} line", irq, line)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistrationError {}

/// Request wire feeding one interrupt line.
pub trait InterruptSource: Send + Sync {
    /// Whether the source currently requests service
    fn is_asserted(&self) -> bool;

    /// Deassert the request at its origin, where the source allows it.
    fn acknowledge(&self) -> HalResult<()> {
        Err(HalError::NotSupported)
    }
}

/// Software-pended request flag, used for lines without a peripheral source.
#[derive(Debug, Default)]
pub struct SoftwareSource {
    pending: AtomicBool,
}

impl SoftwareSource {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Assert the request
    pub fn pend(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Deassert the request
    pub fn clear(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }
}

impl InterruptSource for SoftwareSource {
    fn is_asserted(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn acknowledge(&self) -> HalResult<()> {
        self.clear();
        Ok(())
    }
}

/// Interrupt controller abstraction
pub trait InterruptController: Send + Sync {
    /// Enable interrupt
    fn enable_interrupt(&mut self, irq: u16) -> HalResult<()>;

    /// Disable interrupt
    fn disable_interrupt(&mut self, irq: u16) -> HalResult<()>;

    /// Set interrupt priority within its level
    fn set_priority(&mut self, irq: u16, priority: InterruptPriority) -> HalResult<()>;

    /// Check if interrupt is pending
    fn is_pending(&self, irq: u16) -> bool;

    /// Clear pending interrupt
    fn clear_pending(&mut self, irq: u16) -> HalResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_splits_control_bits() {
        let cfg = EclicConfig::default();
        assert_eq!(cfg.max_level(), 3);
        assert_eq!(cfg.max_priority(), 1);
    }

    #[test]
    fn validate_rejects_unencodable_lines() {
        let cfg = EclicConfig::default();
        assert!(cfg.validate(&InterruptLine::vectored(49, 3, 0)).is_ok());
        assert_eq!(
            cfg.validate(&InterruptLine::vectored(49, 4, 0)),
            Err(RegistrationError::InvalidLevel {
                irq: 49,
                level: 4,
                max: 3
            })
        );
        assert_eq!(
            cfg.validate(&InterruptLine::non_vectored(50, 2, 2)),
            Err(RegistrationError::InvalidPriority {
                irq: 50,
                priority: 2,
                max: 1
            })
        );
        assert_eq!(
            cfg.validate(&InterruptLine::vectored(87, 1, 0)),
            Err(RegistrationError::IrqOutOfRange { irq: 87, max: 86 })
        );
    }

    #[test]
    fn controller_without_lines_rejects_every_irq() {
        let cfg = EclicConfig {
            num_interrupts: 0,
            ..EclicConfig::default()
        };
        assert_eq!(
            cfg.validate(&InterruptLine::vectored(0, 1, 0)),
            Err(RegistrationError::IrqOutOfRange { irq: 0, max: 0 })
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn registration_errors_render_irq_and_limit() {
        assert_eq!(
            RegistrationError::InvalidLevel {
                irq: 49,
                level: 4,
                max: 3
            }
            .to_string(),
            "irq 49: level 4 exceeds max level 3"
        );
        assert_eq!(
            RegistrationError::SlotOccupied { irq: 50 }.to_string(),
            "irq 50 already has a handler"
        );
        assert_eq!(
            RegistrationError::DisciplineMismatch {
                irq: 49,
                line: Discipline::Vectored
            }
            .to_string(),
            format!("irq 49: handler does not match {} line", Discipline::Vectored)
        );
        let err: &dyn std::error::Error = &RegistrationError::SlotOccupied { irq: 50 };
        assert!(err.source().is_none());
    }

    #[test]
    fn level_only_geometry_has_single_priority() {
        let cfg = EclicConfig {
            num_interrupts: 16,
            ctl_bits: 3,
            level_bits: 3,
        };
        assert_eq!(cfg.max_level(), 7);
        assert_eq!(cfg.max_priority(), 0);
    }

    #[test]
    fn software_source_pends_and_clears() {
        let source = SoftwareSource::new();
        assert!(!source.is_asserted());
        source.pend();
        assert!(source.is_asserted());
        source.clear();
        assert!(!source.is_asserted());
    }
}
