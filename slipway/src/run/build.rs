//! Parallel build stage: one fan-out per matrix entry, joined before any
//! release decision.

use std::future::Future;
use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};

use super::{elapsed_ms, RunContext};
use crate::config::ProjectConfig;
use crate::errors::{BuildStepError, DependencyError, PackagingError, UploadError};
use crate::events::RunEvent;
use crate::matrix::{BuildMatrix, MatrixEntry};
use crate::ports::{ArtifactBlob, ArtifactKey, PipelinePorts};
use crate::retry::{with_retry, RetryConfig};

/// One step in the per-entry build sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    /// Fetch the source tree at the triggering ref.
    Checkout,
    /// Make sure the runtime is available.
    Provision,
    /// Install dependencies from the manifest.
    Install,
    /// Package the project into one executable.
    Package,
    /// Store the executable keyed by run and entry.
    Upload,
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Checkout => "checkout",
            Self::Provision => "provision",
            Self::Install => "install",
            Self::Package => "package",
            Self::Upload => "upload",
        };
        f.write_str(name)
    }
}

impl From<&BuildStepError> for BuildStep {
    fn from(err: &BuildStepError) -> Self {
        match err {
            BuildStepError::Checkout(_) => Self::Checkout,
            BuildStepError::Provisioning(_) => Self::Provision,
            BuildStepError::Dependency(_) => Self::Install,
            BuildStepError::Packaging(_) => Self::Package,
            BuildStepError::Upload(_) => Self::Upload,
        }
    }
}

/// How one matrix entry ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// The entry stored its artifact.
    Succeeded,
    /// A build step failed.
    Failed,
    /// The entry observed cancellation and stopped between steps.
    Cancelled,
}

/// What one entry stored, as recorded at upload time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Stored file name.
    pub file_name: String,
    /// Digest of the stored bytes.
    pub sha256: String,
    /// Size of the stored bytes.
    pub size: u64,
}

/// The settled result of one matrix entry.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    /// The matrix entry this outcome belongs to.
    pub entry: MatrixEntry,
    /// How the entry ended.
    pub status: EntryStatus,
    /// The failure, when the entry failed.
    pub error: Option<BuildStepError>,
    /// The stored artifact, when the entry succeeded.
    pub artifact: Option<ArtifactRecord>,
    /// Wall time of the entry in milliseconds.
    pub duration_ms: u64,
}

impl EntryOutcome {
    fn succeeded(entry: MatrixEntry, artifact: ArtifactRecord, duration_ms: u64) -> Self {
        Self {
            entry,
            status: EntryStatus::Succeeded,
            error: None,
            artifact: Some(artifact),
            duration_ms,
        }
    }

    fn failed(entry: MatrixEntry, error: BuildStepError, duration_ms: u64) -> Self {
        Self {
            entry,
            status: EntryStatus::Failed,
            error: Some(error),
            artifact: None,
            duration_ms,
        }
    }

    fn cancelled(entry: MatrixEntry, duration_ms: u64) -> Self {
        Self {
            entry,
            status: EntryStatus::Cancelled,
            error: None,
            artifact: None,
            duration_ms,
        }
    }

    /// The matrix entry id.
    #[must_use]
    pub const fn entry_id(&self) -> &'static str {
        self.entry.entry_id()
    }

    /// True when the entry stored its artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == EntryStatus::Succeeded
    }

    /// The step that failed, when the entry failed.
    #[must_use]
    pub fn failed_step(&self) -> Option<BuildStep> {
        self.error.as_ref().map(BuildStep::from)
    }
}

/// Runs every matrix entry concurrently and joins on all of them.
///
/// A failing entry settles its own outcome and nothing else: sibling
/// entries keep building, and the join barrier waits for every entry before
/// the run moves on. Cancellation is observed between steps, so an entry
/// that is mid-step finishes that step and then stops.
#[derive(Debug, Clone)]
pub struct BuildStage {
    ports: PipelinePorts,
    project: ProjectConfig,
    workspace_root: PathBuf,
    retry: RetryConfig,
}

/// Why one entry stopped building.
enum EntryError {
    Cancelled,
    Step(BuildStepError),
}

impl From<BuildStepError> for EntryError {
    fn from(err: BuildStepError) -> Self {
        Self::Step(err)
    }
}

impl BuildStage {
    /// Creates the stage.
    #[must_use]
    pub const fn new(
        ports: PipelinePorts,
        project: ProjectConfig,
        workspace_root: PathBuf,
        retry: RetryConfig,
    ) -> Self {
        Self {
            ports,
            project,
            workspace_root,
            retry,
        }
    }

    /// Builds every entry of the matrix and returns all outcomes in matrix
    /// order.
    pub async fn run(
        &self,
        ctx: &RunContext,
        reference: &str,
        matrix: &BuildMatrix,
    ) -> Vec<EntryOutcome> {
        let mut in_flight: FuturesUnordered<_> = matrix
            .entries()
            .iter()
            .map(|entry| self.run_entry(ctx, reference, entry))
            .collect();

        let mut outcomes = Vec::with_capacity(matrix.len());
        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
        }
        drop(in_flight);

        outcomes.sort_by_key(|outcome| {
            matrix
                .entries()
                .iter()
                .position(|entry| entry.entry_id() == outcome.entry_id())
        });
        outcomes
    }

    async fn run_entry(
        &self,
        ctx: &RunContext,
        reference: &str,
        entry: &MatrixEntry,
    ) -> EntryOutcome {
        let start = Instant::now();
        ctx.emit(RunEvent::EntryStarted {
            run_id: ctx.run_id,
            entry_id: entry.entry_id().to_string(),
        })
        .await;

        let result = self.build_entry(ctx, reference, entry).await;
        let duration_ms = elapsed_ms(start);

        match result {
            Ok(artifact) => {
                tracing::info!(
                    entry = entry.entry_id(),
                    artifact = %artifact.file_name,
                    duration_ms,
                    "entry built"
                );
                ctx.emit(RunEvent::EntryCompleted {
                    run_id: ctx.run_id,
                    entry_id: entry.entry_id().to_string(),
                    artifact_name: artifact.file_name.clone(),
                })
                .await;
                EntryOutcome::succeeded(entry.clone(), artifact, duration_ms)
            }
            Err(EntryError::Cancelled) => {
                ctx.emit(RunEvent::EntryCancelled {
                    run_id: ctx.run_id,
                    entry_id: entry.entry_id().to_string(),
                })
                .await;
                EntryOutcome::cancelled(entry.clone(), duration_ms)
            }
            Err(EntryError::Step(err)) => {
                tracing::warn!(
                    entry = entry.entry_id(),
                    step = err.step_label(),
                    error = %err,
                    "entry failed"
                );
                ctx.emit(RunEvent::EntryFailed {
                    run_id: ctx.run_id,
                    entry_id: entry.entry_id().to_string(),
                    step: BuildStep::from(&err),
                    error: err.to_string(),
                })
                .await;
                EntryOutcome::failed(entry.clone(), err, duration_ms)
            }
        }
    }

    async fn build_entry(
        &self,
        ctx: &RunContext,
        reference: &str,
        entry: &MatrixEntry,
    ) -> Result<ArtifactRecord, EntryError> {
        let entry_dir = self
            .workspace_root
            .join(ctx.run_id.to_string())
            .join(entry.entry_id());
        let checkout_dir = entry_dir.join("src");

        ensure_live(ctx)?;
        let tree = self
            .timed(ctx, entry, BuildStep::Checkout, async {
                self.ports.source.checkout(reference, &checkout_dir).await
            })
            .await
            .map_err(BuildStepError::from)?;

        ensure_live(ctx)?;
        self.timed(ctx, entry, BuildStep::Provision, async {
            self.ports
                .provisioner
                .provision(&self.project.runtime_version)
                .await
        })
        .await
        .map_err(BuildStepError::from)?;

        ensure_live(ctx)?;
        self.timed(
            ctx,
            entry,
            BuildStep::Install,
            with_retry(&self.retry, "install", DependencyError::is_transient, || {
                self.ports.installer.install(&tree, &self.project.manifest)
            }),
        )
        .await
        .map_err(BuildStepError::from)?;

        ensure_live(ctx)?;
        let built_path = self
            .timed(ctx, entry, BuildStep::Package, async {
                self.ports
                    .packager
                    .package(&tree, &self.project.entry_point, &entry.artifact_name)
                    .await
            })
            .await
            .map_err(BuildStepError::from)?;

        // A packager claiming success without the file on disk fails here.
        let bytes = tokio::fs::read(&built_path).await.map_err(|_| {
            BuildStepError::from(PackagingError::MissingOutput(entry.artifact_name.clone()))
        })?;

        ensure_live(ctx)?;
        let blob = ArtifactBlob::new(entry.artifact_name.clone(), bytes);
        let record = ArtifactRecord {
            file_name: blob.file_name.clone(),
            sha256: blob.sha256(),
            size: blob.size(),
        };
        let key = ArtifactKey::new(ctx.run_id, entry.entry_id());
        self.timed(
            ctx,
            entry,
            BuildStep::Upload,
            with_retry(&self.retry, "upload", UploadError::is_transient, || {
                self.ports.store.put(&key, blob.clone())
            }),
        )
        .await
        .map_err(BuildStepError::from)?;

        Ok(record)
    }

    /// Runs one step with started/completed events around it.
    async fn timed<T, E, Fut>(
        &self,
        ctx: &RunContext,
        entry: &MatrixEntry,
        step: BuildStep,
        op: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        ctx.emit(RunEvent::StepStarted {
            run_id: ctx.run_id,
            entry_id: entry.entry_id().to_string(),
            step,
        })
        .await;
        let start = Instant::now();

        let result = op.await;
        if result.is_ok() {
            ctx.emit(RunEvent::StepCompleted {
                run_id: ctx.run_id,
                entry_id: entry.entry_id().to_string(),
                step,
                duration_ms: elapsed_ms(start),
            })
            .await;
        }
        result
    }
}

fn ensure_live(ctx: &RunContext) -> Result<(), EntryError> {
    if ctx.cancel.is_cancelled() {
        Err(EntryError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CheckoutError;

    #[test]
    fn test_step_from_error_matches_label() {
        let err = BuildStepError::from(CheckoutError::NotFound("v1".to_string()));
        assert_eq!(BuildStep::from(&err), BuildStep::Checkout);
        assert_eq!(BuildStep::from(&err).to_string(), err.step_label());
    }

    #[test]
    fn test_step_serializes_snake_case() {
        let json = serde_json::to_value(BuildStep::Upload).unwrap();
        assert_eq!(json, "upload");
    }

    #[test]
    fn test_failed_outcome_reports_step() {
        let entry = MatrixEntry::for_platform(crate::matrix::Platform::Linux, "m");
        let err = BuildStepError::from(PackagingError::Build("boom".to_string()));
        let outcome = EntryOutcome::failed(entry, err, 12);

        assert_eq!(outcome.status, EntryStatus::Failed);
        assert_eq!(outcome.failed_step(), Some(BuildStep::Package));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_cancelled_outcome_has_no_error() {
        let entry = MatrixEntry::for_platform(crate::matrix::Platform::Windows, "m");
        let outcome = EntryOutcome::cancelled(entry, 3);

        assert_eq!(outcome.status, EntryStatus::Cancelled);
        assert!(outcome.error.is_none());
        assert!(outcome.failed_step().is_none());
    }
}
