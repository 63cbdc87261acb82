//! Typed SSA intermediate representation for hardware descriptions.
//!
//! A [`Context`] owns uniqued types and constants; a [`Module`] owns
//! units (entities, processes, functions), their blocks and
//! instructions, and the def-use graph connecting everything. The
//! [`Builder`] is the type-checked way to construct instructions; the
//! assembly [`read_module`]/[`write_module`] pair round-trips the whole
//! structure through text.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod builder;
mod constant;
mod context;
mod diagnostic;
mod inst;
mod module;
mod parse;
mod ty;
mod value;
mod write;

pub use builder::Builder;
pub use constant::{Const, ConstData, ConstKind};
pub use context::Context;
pub use diagnostic::{
    Diagnostic, DiagnosticSink, IgnoreDiagnostics, IrError, Severity, SourceRange,
};
pub use inst::{BinaryOp, CmpOp, ConvertOp, InstData, InstKind, Placement, UnaryOp};
pub use module::Module;
pub use parse::{read_module, Lexer, ReadError, Token, TokenKind};
pub use ty::{Type, TypeKind};
pub use value::{BlockData, Dir, UnitData, UnitKind, Use, Value, ValueData};
pub use write::{module_to_string, type_to_string, write_module};

/// Convenience re-exports for building and inspecting modules.
pub mod prelude {
    pub use crate::{
        BinaryOp, Builder, CmpOp, Const, Context, ConvertOp, Diagnostic, DiagnosticSink, Dir,
        InstKind, IrError, Module, Type, TypeKind, UnaryOp, UnitKind, Value, ValueData,
    };
    pub use lhd_types::{ApInt, Logic, LogicBit, TimeValue};
}
