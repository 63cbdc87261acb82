use lhd_ir::Value;
use lhd_types::ArithError;

/// Runtime failure of the executor. Any of these moves the executor to
/// the stopped state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// A `switch` found no matching case and carries no default.
    #[error("no switch case matched and no default given")]
    NoMatch,
    /// An operand has no value bound in the environment.
    #[error("no value bound for {0:?}")]
    Unbound(Value),
    /// The instruction kind cannot be evaluated by the executor.
    #[error("instruction {0:?} is not executable")]
    Unsupported(Value),
    /// Arithmetic failed, e.g. a runtime division by zero.
    #[error("arithmetic fault: {0}")]
    Arith(#[from] ArithError),
    /// The executor was stepped while stopped.
    #[error("executor is stopped")]
    Stopped,
}
