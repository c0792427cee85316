//! Typed lifecycle events emitted during a pipeline run.

use serde::Serialize;

use crate::ports::RunId;
use crate::run::{BuildStep, RunState};
use crate::trigger::TriggerKind;

/// One lifecycle event of a pipeline run.
///
/// Events are emitted through an [`EventSink`](super::EventSink) as the run
/// progresses. They carry the minimum needed to reconstruct what happened;
/// the full outcome lives in the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum RunEvent {
    /// A trigger event was accepted and a run was created.
    #[serde(rename = "run.triggered")]
    RunTriggered {
        /// The run this event belongs to.
        run_id: RunId,
        /// The pushed ref.
        reference: String,
        /// Branch push or tag push.
        trigger: TriggerKind,
    },

    /// The run advanced to a new state.
    #[serde(rename = "run.state_changed")]
    StateChanged {
        /// The run this event belongs to.
        run_id: RunId,
        /// The state the run left.
        from: RunState,
        /// The state the run entered.
        to: RunState,
    },

    /// A matrix entry started building.
    #[serde(rename = "entry.started")]
    EntryStarted {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
    },

    /// A build step of one entry started.
    #[serde(rename = "entry.step_started")]
    StepStarted {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
        /// Which build step started.
        step: BuildStep,
    },

    /// A build step of one entry completed.
    #[serde(rename = "entry.step_completed")]
    StepCompleted {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
        /// Which build step completed.
        step: BuildStep,
        /// Wall time of the step in milliseconds.
        duration_ms: u64,
    },

    /// A matrix entry finished with its artifact stored.
    #[serde(rename = "entry.completed")]
    EntryCompleted {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
        /// The stored artifact file name.
        artifact_name: String,
    },

    /// A matrix entry failed. Sibling entries keep running.
    #[serde(rename = "entry.failed")]
    EntryFailed {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
        /// The step that failed.
        step: BuildStep,
        /// Human-readable failure description.
        error: String,
    },

    /// A matrix entry observed cancellation and stopped.
    #[serde(rename = "entry.cancelled")]
    EntryCancelled {
        /// The run this event belongs to.
        run_id: RunId,
        /// The matrix entry id.
        entry_id: String,
    },

    /// The release was published with all artifacts attached.
    #[serde(rename = "release.published")]
    ReleasePublished {
        /// The run this event belongs to.
        run_id: RunId,
        /// The released tag.
        tag: String,
        /// Names of the published assets.
        assets: Vec<String>,
    },

    /// The release stage failed. No partial release exists.
    #[serde(rename = "release.failed")]
    ReleaseFailed {
        /// The run this event belongs to.
        run_id: RunId,
        /// The tag that was being released.
        tag: String,
        /// Human-readable failure description.
        error: String,
    },

    /// The run was cancelled.
    #[serde(rename = "run.cancelled")]
    RunCancelled {
        /// The run this event belongs to.
        run_id: RunId,
        /// The cancellation reason.
        reason: String,
    },
}

impl RunEvent {
    /// Dotted event name, stable across versions.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunTriggered { .. } => "run.triggered",
            Self::StateChanged { .. } => "run.state_changed",
            Self::EntryStarted { .. } => "entry.started",
            Self::StepStarted { .. } => "entry.step_started",
            Self::StepCompleted { .. } => "entry.step_completed",
            Self::EntryCompleted { .. } => "entry.completed",
            Self::EntryFailed { .. } => "entry.failed",
            Self::EntryCancelled { .. } => "entry.cancelled",
            Self::ReleasePublished { .. } => "release.published",
            Self::ReleaseFailed { .. } => "release.failed",
            Self::RunCancelled { .. } => "run.cancelled",
        }
    }

    /// The run this event belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        match self {
            Self::RunTriggered { run_id, .. }
            | Self::StateChanged { run_id, .. }
            | Self::EntryStarted { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::EntryCompleted { run_id, .. }
            | Self::EntryFailed { run_id, .. }
            | Self::EntryCancelled { run_id, .. }
            | Self::ReleasePublished { run_id, .. }
            | Self::ReleaseFailed { run_id, .. }
            | Self::RunCancelled { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_serde_tag() {
        let event = RunEvent::EntryStarted {
            run_id: RunId::new(),
            entry_id: "linux".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.kind());
    }

    #[test]
    fn test_state_change_serializes_states_as_snake_case() {
        let event = RunEvent::StateChanged {
            run_id: RunId::new(),
            from: RunState::Triggered,
            to: RunState::BuildRunning,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "triggered");
        assert_eq!(json["to"], "build_running");
    }
}
