//! The orchestrator: trigger event in, run report out.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::build::{BuildStage, EntryOutcome};
use super::release::ReleaseStage;
use super::report::{EntryReport, ReleaseReport, RunReport};
use super::state::{RunState, RunStateMachine};
use super::{elapsed_ms, RunContext};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::matrix::{BuildMatrix, MatrixEntry};
use crate::ports::{PipelinePorts, RunId};
use crate::trigger::{is_release_trigger, TagPattern, TriggerEvent, TriggerKind};

/// What a trigger event would make the pipeline do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlan {
    /// The pushed ref.
    pub reference: String,
    /// Branch push or tag push.
    pub trigger: TriggerKind,
    /// The matrix entries that would build.
    pub entries: Vec<MatrixEntry>,
    /// Whether a fully successful build would be released.
    pub release: bool,
    /// Stable digest of the plan. The same ref against the same matrix
    /// always fingerprints identically.
    pub fingerprint: String,
}

/// Drives one pipeline run end to end.
///
/// The run fans out one build per matrix entry, joins on all of them, and
/// only then decides about the release: every entry must have succeeded and
/// the trigger must be a tag matching the release pattern. Build and
/// release failures are recorded in the returned [`RunReport`], not raised
/// as errors.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    matrix: BuildMatrix,
    tag_pattern: TagPattern,
    build: BuildStage,
    release: ReleaseStage,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("matrix", &self.matrix)
            .field("tag_pattern", &self.tag_pattern.as_str())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator from a validated configuration and a set of
    /// collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration fails validation.
    pub fn new(config: PipelineConfig, ports: PipelinePorts) -> Result<Self> {
        config.validate()?;
        let matrix = config.build_matrix()?;
        let tag_pattern = config.release.compiled_pattern()?;
        let build = BuildStage::new(
            ports.clone(),
            config.project.clone(),
            config.workspace_root.clone(),
            config.retry.clone(),
        );
        let release = ReleaseStage::new(ports.store.clone(), ports.release.clone());

        Ok(Self {
            config,
            matrix,
            tag_pattern,
            build,
            release,
            sink: Arc::new(NoOpEventSink),
        })
    }

    /// Replaces the event sink. Defaults to [`NoOpEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The configuration this orchestrator was built from.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The matrix this orchestrator builds.
    #[must_use]
    pub const fn matrix(&self) -> &BuildMatrix {
        &self.matrix
    }

    /// Describes what `event` would make the pipeline do, without running
    /// anything.
    #[must_use]
    pub fn plan(&self, event: &TriggerEvent) -> RunPlan {
        let entries = self.matrix.entries().to_vec();
        RunPlan {
            reference: event.reference.clone(),
            trigger: event.kind,
            release: is_release_trigger(event, &self.tag_pattern),
            fingerprint: plan_fingerprint(event, &entries),
            entries,
        }
    }

    /// Runs the pipeline for `event` with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// Build and release failures settle into the report. An error is only
    /// returned for orchestration defects such as an illegal state
    /// transition.
    pub async fn run(&self, event: &TriggerEvent) -> Result<RunReport> {
        self.run_with_token(event, CancellationToken::shared()).await
    }

    /// Runs the pipeline for `event`, observing `cancel` between steps.
    ///
    /// Cancelling stops every in-flight entry at its next step boundary,
    /// forbids the release stage, and freezes the run's state where it
    /// stood. The joined outcomes gathered so far are still reported.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_with_token(
        &self,
        event: &TriggerEvent,
        cancel: Arc<CancellationToken>,
    ) -> Result<RunReport> {
        let run_id = RunId::new();
        let ctx = RunContext::new(run_id, cancel, self.sink.clone());
        let plan = self.plan(event);
        let started_at = Utc::now();
        let start = Instant::now();
        let mut machine = RunStateMachine::new();

        let mut report = RunReport {
            run_id,
            reference: event.reference.clone(),
            trigger: event.kind,
            state: machine.current(),
            cancelled: false,
            cancel_reason: None,
            plan_fingerprint: plan.fingerprint.clone(),
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            entries: Vec::new(),
            release: None,
        };

        tracing::info!(
            run_id = %run_id,
            reference = %event.reference,
            trigger = %event.kind,
            release = plan.release,
            "run triggered"
        );
        ctx.emit(RunEvent::RunTriggered {
            run_id,
            reference: event.reference.clone(),
            trigger: event.kind,
        })
        .await;
        self.advance(&ctx, &mut machine, RunState::Triggered).await?;
        self.advance(&ctx, &mut machine, RunState::BuildRunning).await?;

        let outcomes = self.build.run(&ctx, &event.reference, &self.matrix).await;
        report.entries = outcomes.iter().map(EntryReport::from).collect();

        if ctx.cancel.is_cancelled() {
            let reason = ctx
                .cancel
                .reason()
                .unwrap_or_else(|| "cancelled".to_string());
            tracing::warn!(run_id = %run_id, reason = %reason, "run cancelled");
            ctx.emit(RunEvent::RunCancelled {
                run_id,
                reason: reason.clone(),
            })
            .await;
            report.cancelled = true;
            report.cancel_reason = Some(reason);
            return Ok(seal(report, machine.current(), start));
        }

        if outcomes.iter().all(EntryOutcome::is_success) {
            self.advance(&ctx, &mut machine, RunState::BuildSucceeded)
                .await?;
        } else {
            self.advance(&ctx, &mut machine, RunState::BuildFailed)
                .await?;
            return Ok(seal(report, machine.current(), start));
        }

        if !plan.release {
            self.advance(&ctx, &mut machine, RunState::Done).await?;
            return Ok(seal(report, machine.current(), start));
        }

        self.advance(&ctx, &mut machine, RunState::ReleaseRunning)
            .await?;
        let tag = event.reference.clone();
        match self.release.run(&ctx, &tag, &self.matrix).await {
            Ok(published) => {
                ctx.emit(RunEvent::ReleasePublished {
                    run_id,
                    tag: tag.clone(),
                    assets: published.assets.clone(),
                })
                .await;
                self.advance(&ctx, &mut machine, RunState::ReleaseSucceeded)
                    .await?;
                report.release = Some(ReleaseReport::published(&published));
            }
            Err(err) => {
                tracing::error!(run_id = %run_id, tag = %tag, error = %err, "release failed");
                ctx.emit(RunEvent::ReleaseFailed {
                    run_id,
                    tag: tag.clone(),
                    error: err.to_string(),
                })
                .await;
                self.advance(&ctx, &mut machine, RunState::ReleaseFailed)
                    .await?;
                report.release = Some(ReleaseReport::failed(tag, &err));
            }
        }

        Ok(seal(report, machine.current(), start))
    }

    async fn advance(
        &self,
        ctx: &RunContext,
        machine: &mut RunStateMachine,
        to: RunState,
    ) -> Result<RunState> {
        let from = machine.current();
        let next = machine.advance(to)?;
        ctx.emit(RunEvent::StateChanged {
            run_id: ctx.run_id,
            from,
            to: next,
        })
        .await;
        Ok(next)
    }
}

fn seal(mut report: RunReport, state: RunState, start: Instant) -> RunReport {
    report.state = state;
    report.finished_at = Utc::now();
    report.duration_ms = elapsed_ms(start);
    report
}

fn plan_fingerprint(event: &TriggerEvent, entries: &[MatrixEntry]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.kind.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(event.reference.as_bytes());
    for entry in entries {
        hasher.update(b"\0");
        hasher.update(entry.artifact_name.as_bytes());
    }
    let mut fingerprint = hex::encode(hasher.finalize());
    fingerprint.truncate(16);
    fingerprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPorts;

    fn orchestrator() -> PipelineOrchestrator {
        let mut config = PipelineConfig::default();
        config.workspace_root = std::env::temp_dir().join("slipway-plan-tests");
        PipelineOrchestrator::new(config, TestPorts::new().ports()).unwrap()
    }

    #[test]
    fn test_plan_is_deterministic() {
        let orchestrator = orchestrator();
        let event = TriggerEvent::tag("v1.2.0");
        assert_eq!(orchestrator.plan(&event), orchestrator.plan(&event));
    }

    #[test]
    fn test_plan_marks_release_only_for_matching_tags() {
        let orchestrator = orchestrator();
        assert!(orchestrator.plan(&TriggerEvent::tag("v1.2.0")).release);
        assert!(!orchestrator.plan(&TriggerEvent::tag("nightly")).release);
        assert!(!orchestrator.plan(&TriggerEvent::push("main")).release);
        assert!(!orchestrator.plan(&TriggerEvent::push("v1.2.0")).release);
    }

    #[test]
    fn test_plan_fingerprint_varies_with_ref() {
        let orchestrator = orchestrator();
        let a = orchestrator.plan(&TriggerEvent::tag("v1.0.0"));
        let b = orchestrator.plan(&TriggerEvent::tag("v1.0.1"));
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.release.tag_pattern = "(broken".to_string();
        assert!(PipelineOrchestrator::new(config, TestPorts::new().ports()).is_err());
    }
}
