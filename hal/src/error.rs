//! Common error types for HAL operations

use core::fmt;

/// HAL operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Invalid parameter provided
    InvalidParameter,
    /// Pin offset outside the 32-bit GPIO bank
    InvalidPin(u32),
    /// Operation not supported by this implementation
    NotSupported,
    /// Pin is not configured for the requested direction
    WrongDirection(u32),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::InvalidPin(pin) => write!(f, "invalid GPIO pin offset {}", pin),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::WrongDirection(pin) => {
                write!(f, "GPIO pin {} not configured for this direction", pin)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

#[cfg(feature = "defmt")]
impl defmt::Format for HalError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InvalidParameter => defmt::write!(fmt, "InvalidParameter"),
            Self::InvalidPin(pin) => defmt::write!(fmt, "InvalidPin({})", pin),
            Self::NotSupported => defmt::write!(fmt, "NotSupported"),
            Self::WrongDirection(pin) => defmt::write!(fmt, "WrongDirection({})", pin),
        }
    }
}

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn pin_errors_name_the_offset() {
        assert_eq!(
            HalError::InvalidPin(40).to_string(),
            "invalid GPIO pin offset 40"
        );
        assert_eq!(
            HalError::WrongDirection(4).to_string(),
            "GPIO pin 4 not configured for this direction"
        );
    }
}
