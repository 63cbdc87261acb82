/// Arithmetic error variants shared by [`ApInt`](crate::ApInt) and
/// [`Logic`](crate::Logic) operations.
///
/// None of the arithmetic routines panic on malformed input; every
/// precondition violation is surfaced as one of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArithError {
    /// Binary operands have differing bit widths.
    #[error("operand widths differ: {lhs} vs {rhs}")]
    WidthMismatch {
        /// Width of the left-hand operand.
        lhs: u32,
        /// Width of the right-hand operand.
        rhs: u32,
    },
    /// Division or remainder with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// The value does not fit into the requested width.
    #[error("value does not fit into {target} bits")]
    Overflow {
        /// Width of the narrowing target.
        target: u32,
    },
    /// A textual literal contained a digit invalid for its base.
    #[error("invalid digit {digit:?} for base {radix}")]
    InvalidDigit {
        /// The offending character.
        digit: char,
        /// The base the literal was parsed in.
        radix: u32,
    },
}

impl ArithError {
    /// Flag whether the error is a width precondition violation.
    pub const fn is_width_mismatch(&self) -> bool {
        matches!(self, Self::WidthMismatch { .. })
    }
}

/// Helper used by the binary operations of both value types.
pub(crate) fn check_widths(lhs: u32, rhs: u32) -> Result<(), ArithError> {
    if lhs == rhs {
        Ok(())
    } else {
        Err(ArithError::WidthMismatch { lhs, rhs })
    }
}
