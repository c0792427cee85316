//! Run orchestration.
//!
//! This module provides:
//! - The run state machine
//! - The parallel build stage with its join barrier
//! - The release stage with fail-closed artifact aggregation
//! - The orchestrator tying trigger, build, and release together
//! - Serializable run reports

mod build;
mod orchestrator;
mod release;
mod report;
mod state;


pub use build::{ArtifactRecord, BuildStage, BuildStep, EntryOutcome, EntryStatus};
pub use orchestrator::{PipelineOrchestrator, RunPlan};
pub use release::ReleaseStage;
pub use report::{EntryReport, ReleaseReport, RunReport};
pub use state::{RunState, RunStateMachine};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::cancellation::CancellationToken;
use crate::events::{EventSink, RunEvent};
use crate::ports::RunId;

/// Shared per-run context handed to every stage.
#[derive(Clone)]
pub struct RunContext {
    /// Unique id of this run.
    pub run_id: RunId,
    /// Cooperative cancellation signal for the run.
    pub cancel: Arc<CancellationToken>,
    /// Sink receiving lifecycle events.
    pub sink: Arc<dyn EventSink>,
}

impl RunContext {
    /// Creates the context for one run.
    #[must_use]
    pub fn new(run_id: RunId, cancel: Arc<CancellationToken>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id,
            cancel,
            sink,
        }
    }

    /// Emits a lifecycle event through the run's sink.
    pub async fn emit(&self, event: RunEvent) {
        self.sink.emit(event).await;
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Elapsed wall-clock milliseconds since `start`, saturating at `u64::MAX`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
