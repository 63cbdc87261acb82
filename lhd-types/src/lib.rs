//! Atomic value types of the LHD intermediate representation.
//!
//! The IR manipulates three kinds of runtime values: width-typed
//! two's-complement integers of arbitrary precision ([`ApInt`]), 9-valued
//! logic vectors ([`Logic`]) and simulation time stamps ([`TimeValue`]).
//! Everything in this crate is a plain value type with no interior
//! mutability, so the IR layers above can unique and hash them freely.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod apint;
mod error;
mod logic;
mod time;

pub use apint::ApInt;
pub use error::ArithError;
pub use logic::{Logic, LogicBit};
pub use time::TimeValue;

/// Result alias for fallible arithmetic on the atomic types.
pub type ArithResult<T> = Result<T, ArithError>;
