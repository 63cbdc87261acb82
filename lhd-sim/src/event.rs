use lhd_ir::{Const, Value};
use lhd_types::TimeValue;

/// A scheduled signal change produced by a `drv` instruction.
///
/// The executor never updates signal values itself; it hands these
/// records to the surrounding event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// When the change takes effect.
    pub time: TimeValue,
    /// The driven signal.
    pub signal: Value,
    /// The constant the signal takes.
    pub value: Const,
}

/// What a suspended executor wants to be woken by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A point in simulation time.
    At(TimeValue),
    /// A change of the observed value.
    Change(Value),
    /// Any change on the process inputs.
    AnyInput,
}
