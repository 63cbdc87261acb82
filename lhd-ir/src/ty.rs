//! Type terms of the IR.
//!
//! Types are owned and uniqued by a [`Context`](crate::Context); a
//! [`Type`] is an opaque handle whose equality within one context is
//! identity. Structural queries go through the context.

use core::fmt;

/// Handle to a uniqued type term inside a context.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Type(pub(crate) u32);

impl Type {
    pub(crate) const fn new(index: usize) -> Self {
        Type(index as u32)
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ty{}", self.0)
    }
}

/// The structural content of a type term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    /// The empty type.
    Void,
    /// A basic-block target.
    Label,
    /// A (real time, delta) simulation time value.
    Time,
    /// Two's-complement integer of the given width.
    Int(u32),
    /// 9-valued logic vector of the given width.
    Logic(u32),
    /// Aggregate with ordered fields.
    Struct(Vec<Type>),
    /// Fixed-length array.
    Array(Type, usize),
    /// Typed address for `alloc`/`ld`/`st`.
    Ptr(Type),
    /// A hardware signal carrying the element type.
    Signal(Type),
    /// Function signature: inputs to outputs.
    Func(Vec<Type>, Vec<Type>),
    /// Entity or process signature over signal element types.
    Comp(Vec<Type>, Vec<Type>),
}

impl TypeKind {
    /// Whether values of this type can be computed by instructions.
    pub fn is_value(&self) -> bool {
        !matches!(
            self,
            TypeKind::Void | TypeKind::Label | TypeKind::Func(..) | TypeKind::Comp(..)
        )
    }
}
