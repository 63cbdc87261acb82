//! Error taxonomy and diagnostic records.
//!
//! Passes and the assembly reader never unwind; they push [`Diagnostic`]
//! records into a [`DiagnosticSink`] and surface a summary result to the
//! caller. Rendering diagnostics is the concern of an external consumer.

use core::fmt;

use lhd_types::ArithError;

/// Error condition representation for the IR core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum IrError {
    /// Operand types do not satisfy the opcode's contract.
    TypeMismatch,
    /// Integer or logic operands of differing widths.
    WidthMismatch,
    /// Constant folding saw a zero divisor; the instruction is left
    /// untouched.
    DivZero,
    /// Narrowing a value that does not fit the target width.
    Overflow,
    /// A block lacks a terminator, has more than one, or an instruction
    /// follows a terminator.
    MalformedBlock,
    /// A reference to a name that was never defined.
    UnresolvedName,
    /// A `switch` found no applicable case and carries no default.
    NoMatch,
    /// Two definitions share one global name during module merging.
    NameCollision,
    /// The requested value cannot be represented, e.g. a null constant
    /// of signal or pointer type.
    Unrepresentable,
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::TypeMismatch => "operand types do not satisfy the opcode contract",
            Self::WidthMismatch => "operand widths differ",
            Self::DivZero => "constant division by zero",
            Self::Overflow => "value does not fit the target width",
            Self::MalformedBlock => "malformed basic block",
            Self::UnresolvedName => "reference to an undefined name",
            Self::NoMatch => "no switch case matched and no default given",
            Self::NameCollision => "duplicate global name",
            Self::Unrepresentable => "value is not representable",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IrError {}

impl From<ArithError> for IrError {
    fn from(err: ArithError) -> Self {
        match err {
            ArithError::WidthMismatch { .. } => Self::WidthMismatch,
            ArithError::DivisionByZero => Self::DivZero,
            ArithError::Overflow { .. } => Self::Overflow,
            ArithError::InvalidDigit { .. } => Self::TypeMismatch,
        }
    }
}

/// Diagnostic severity, error first so that `Ord` sorts by weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// The operation failed.
    Error,
    /// Suspicious but not fatal.
    Warning,
    /// Supplementary information attached to another diagnostic.
    Note,
}

/// Half-open byte range into a source buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceRange {
    /// First byte of the range.
    pub start: usize,
    /// One past the last byte of the range.
    pub end: usize,
}

impl SourceRange {
    /// Construct a range; `start` must not exceed `end`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// The smallest range covering both inputs.
    pub fn merge(self, other: SourceRange) -> SourceRange {
        SourceRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One diagnostic record: a severity, a message, and optional source
/// ranges for the renderer to highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Weight of the diagnostic.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// The primary range this diagnostic refers to, if known.
    pub range: Option<SourceRange>,
    /// Secondary ranges worth highlighting.
    pub highlights: Vec<SourceRange>,
}

impl Diagnostic {
    /// An error diagnostic without source attribution.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            range: None,
            highlights: Vec::new(),
        }
    }

    /// Attach the primary source range.
    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Attach a secondary highlight range.
    pub fn with_highlight(mut self, range: SourceRange) -> Self {
        self.highlights.push(range);
        self
    }
}

impl From<IrError> for Diagnostic {
    fn from(err: IrError) -> Self {
        Diagnostic::error(err.to_string())
    }
}

/// Receiver for diagnostic records.
pub trait DiagnosticSink {
    /// Accept one diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// A sink that drops everything, for callers that only care about the
/// summary result.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreDiagnostics;

impl DiagnosticSink for IgnoreDiagnostics {
    fn report(&mut self, _: Diagnostic) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_error_displays_a_message() {
        for err in IrError::iter() {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn arith_errors_map_into_the_taxonomy() {
        assert_eq!(
            IrError::from(ArithError::DivisionByZero),
            IrError::DivZero
        );
        assert_eq!(
            IrError::from(ArithError::WidthMismatch { lhs: 4, rhs: 8 }),
            IrError::WidthMismatch
        );
        assert_eq!(
            IrError::from(ArithError::Overflow { target: 64 }),
            IrError::Overflow
        );
    }

    #[test]
    fn ranges_merge() {
        let a = SourceRange::new(4, 10);
        let b = SourceRange::new(8, 12);
        assert_eq!(a.merge(b), SourceRange::new(4, 12));
    }
}
