//! Per-component run state.

/// The run state of one engine component.
///
/// Each manager guards its long-running operation with one of these:
/// a call while the component is `Running` is a no-op, not queued, and
/// clearing the credential moves a running component to `Canceling`
/// until its in-flight work observes the cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No operation in flight; a new one may start.
    #[default]
    Idle,
    /// An operation is in flight; new starts are no-ops.
    Running,
    /// An operation is in flight but its session was cancelled.
    Canceling,
}

impl RunState {
    /// Returns true if a new operation may start.
    pub fn can_start(&self) -> bool {
        matches!(self, RunState::Idle)
    }

    /// Returns true if an operation is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Canceling)
    }
}
