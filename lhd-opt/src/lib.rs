//! Semantic passes over the LHD intermediate representation.
//!
//! Three passes exercise the IR: constant folding over
//! arbitrary-precision arithmetic, unreachable-block elimination driven
//! by predecessor counts, and desequentialisation, which rewrites a
//! process with conditional drives into an entity with explicit storage
//! elements. The boolean algebra the latter builds on is exported as
//! [`BoolExpr`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod boolexpr;
mod const_fold;
mod deseq;
mod unreachable;

pub use boolexpr::BoolExpr;
pub use const_fold::{fold_module, fold_unit};
pub use deseq::desequentialize;
pub use unreachable::delete_unreachable_blocks;
