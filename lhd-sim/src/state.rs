/// Executor state machine.
///
/// A process is cyclic: `ret` moves back to `Ready` with the
/// instruction pointer at the entry block, so the next run re-evaluates
/// the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecState {
    /// Positioned at the entry, ready to run.
    Ready,
    /// Currently stepping.
    Running,
    /// Parked on a wait; see the pending [`Wakeup`](crate::Wakeup).
    Suspended,
    /// Halted on an error; stepping again is not allowed.
    Stopped,
}

impl ExecState {
    /// Whether the executor may continue stepping.
    pub const fn can_step(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }
}

impl Default for ExecState {
    fn default() -> Self {
        Self::Ready
    }
}
