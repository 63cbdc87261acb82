//! Constant values owned by a context.

use core::fmt;

use lhd_types::{ApInt, Logic, TimeValue};

use crate::Type;

/// Handle to a uniqued constant inside a context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Const(pub(crate) u32);

impl Const {
    pub(crate) const fn new(index: usize) -> Self {
        Const(index as u32)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "const{}", self.0)
    }
}

/// A constant's payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstKind {
    /// Integer literal.
    Int(ApInt),
    /// Logic vector literal.
    Logic(Logic),
    /// Time literal.
    Time(TimeValue),
    /// Field- or element-wise aggregate, used for null values of struct
    /// and array type.
    Aggregate(Vec<Const>),
}

/// A constant: its type handle plus the payload the type interprets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstData {
    /// The constant's type within the owning context.
    pub ty: Type,
    /// The literal payload.
    pub kind: ConstKind,
}

impl ConstData {
    /// The integer payload, if this is an integer constant.
    pub fn as_int(&self) -> Option<&ApInt> {
        match &self.kind {
            ConstKind::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The logic payload, if this is a logic constant.
    pub fn as_logic(&self) -> Option<&Logic> {
        match &self.kind {
            ConstKind::Logic(v) => Some(v),
            _ => None,
        }
    }

    /// The time payload, if this is a time constant.
    pub fn as_time(&self) -> Option<TimeValue> {
        match self.kind {
            ConstKind::Time(v) => Some(v),
            _ => None,
        }
    }
}
