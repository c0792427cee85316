//! Run lifecycle states and the machine that enforces their order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::StateError;

/// Lifecycle state of a pipeline run.
///
/// A run moves strictly forward. The build stage settles into
/// `BuildSucceeded` or `BuildFailed`; only a fully successful build on a
/// release trigger enters the release states, otherwise the run closes at
/// `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run in progress.
    Idle,
    /// A trigger event was accepted.
    Triggered,
    /// Matrix entries are building.
    BuildRunning,
    /// Every matrix entry stored its artifact.
    BuildSucceeded,
    /// At least one matrix entry failed.
    BuildFailed,
    /// The release stage is publishing.
    ReleaseRunning,
    /// The release was published with all artifacts attached.
    ReleaseSucceeded,
    /// The release stage failed; no partial release exists.
    ReleaseFailed,
    /// The run finished without a release being wanted.
    Done,
}

impl RunState {
    /// True when the run can make no further progress.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::BuildFailed | Self::ReleaseSucceeded | Self::ReleaseFailed | Self::Done
        )
    }

    /// True for the two fully successful outcomes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Done | Self::ReleaseSucceeded)
    }

    /// True for the two failure outcomes.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::BuildFailed | Self::ReleaseFailed)
    }

    /// Whether the machine may move from this state to `next`.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Triggered)
                | (Self::Triggered, Self::BuildRunning)
                | (Self::BuildRunning, Self::BuildSucceeded | Self::BuildFailed)
                | (Self::BuildSucceeded, Self::ReleaseRunning | Self::Done)
                | (Self::ReleaseRunning, Self::ReleaseSucceeded | Self::ReleaseFailed)
        )
    }

    /// Process exit code for a run that ended in this state.
    ///
    /// Full success is 0, a build failure is 1, a release failure is 2. A
    /// run interrupted before reaching a terminal state also reports 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Done | Self::ReleaseSucceeded => 0,
            Self::ReleaseFailed => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Triggered => "triggered",
            Self::BuildRunning => "build_running",
            Self::BuildSucceeded => "build_succeeded",
            Self::BuildFailed => "build_failed",
            Self::ReleaseRunning => "release_running",
            Self::ReleaseSucceeded => "release_succeeded",
            Self::ReleaseFailed => "release_failed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Enforces the legal order of [`RunState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStateMachine {
    state: RunState,
}

impl RunStateMachine {
    /// Creates a machine in the `Idle` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn current(&self) -> RunState {
        self.state
    }

    /// Moves to `next`, or reports the illegal transition.
    pub fn advance(&mut self, next: RunState) -> Result<RunState, StateError> {
        if self.state.can_advance_to(next) {
            self.state = next;
            Ok(next)
        } else {
            Err(StateError {
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_through(machine: &mut RunStateMachine, states: &[RunState]) {
        for state in states {
            machine.advance(*state).unwrap();
        }
    }

    #[test]
    fn test_push_run_without_release_ends_done() {
        let mut machine = RunStateMachine::new();
        advance_through(
            &mut machine,
            &[
                RunState::Triggered,
                RunState::BuildRunning,
                RunState::BuildSucceeded,
                RunState::Done,
            ],
        );
        assert!(machine.current().is_terminal());
        assert!(machine.current().is_success());
        assert_eq!(machine.current().exit_code(), 0);
    }

    #[test]
    fn test_release_path() {
        let mut machine = RunStateMachine::new();
        advance_through(
            &mut machine,
            &[
                RunState::Triggered,
                RunState::BuildRunning,
                RunState::BuildSucceeded,
                RunState::ReleaseRunning,
                RunState::ReleaseSucceeded,
            ],
        );
        assert!(machine.current().is_success());
    }

    #[test]
    fn test_build_failure_is_terminal() {
        let mut machine = RunStateMachine::new();
        advance_through(
            &mut machine,
            &[
                RunState::Triggered,
                RunState::BuildRunning,
                RunState::BuildFailed,
            ],
        );
        assert!(machine.current().is_terminal());
        assert!(machine.advance(RunState::ReleaseRunning).is_err());
        assert_eq!(machine.current().exit_code(), 1);
    }

    #[test]
    fn test_release_failure_exit_code() {
        assert_eq!(RunState::ReleaseFailed.exit_code(), 2);
    }

    #[test]
    fn test_release_cannot_start_from_failed_build() {
        assert!(!RunState::BuildFailed.can_advance_to(RunState::ReleaseRunning));
    }

    #[test]
    fn test_illegal_transition_names_both_states() {
        let mut machine = RunStateMachine::new();
        let err = machine.advance(RunState::BuildRunning).unwrap_err();
        assert_eq!(err.from, "idle");
        assert_eq!(err.to, "build_running");
    }

    #[test]
    fn test_states_serialize_snake_case() {
        let json = serde_json::to_value(RunState::ReleaseRunning).unwrap();
        assert_eq!(json, "release_running");
    }
}
