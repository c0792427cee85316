//! The structured account of one pipeline run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::build::{ArtifactRecord, BuildStep, EntryOutcome, EntryStatus};
use super::state::RunState;
use crate::errors::ReleaseError;
use crate::matrix::Platform;
use crate::ports::{PublishedRelease, RunId};
use crate::trigger::TriggerKind;

/// Per-entry section of a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryReport {
    /// The matrix entry id.
    pub entry_id: String,
    /// The platform the entry builds for.
    pub platform: Platform,
    /// The artifact name the entry is expected to produce.
    pub artifact_name: String,
    /// How the entry ended.
    pub status: EntryStatus,
    /// The step that failed, when the entry failed.
    pub failed_step: Option<BuildStep>,
    /// Human-readable failure description.
    pub error: Option<String>,
    /// The stored artifact, when the entry succeeded.
    pub artifact: Option<ArtifactRecord>,
    /// Wall time of the entry in milliseconds.
    pub duration_ms: u64,
}

impl From<&EntryOutcome> for EntryReport {
    fn from(outcome: &EntryOutcome) -> Self {
        Self {
            entry_id: outcome.entry_id().to_string(),
            platform: outcome.entry.platform,
            artifact_name: outcome.entry.artifact_name.clone(),
            status: outcome.status,
            failed_step: outcome.failed_step(),
            error: outcome.error.as_ref().map(ToString::to_string),
            artifact: outcome.artifact.clone(),
            duration_ms: outcome.duration_ms,
        }
    }
}

/// Release section of a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseReport {
    /// The tag the release was for.
    pub tag: String,
    /// Whether the release was published.
    pub published: bool,
    /// Where the release can be seen, when the host reports one.
    pub url: Option<String>,
    /// Names of the published assets.
    pub assets: Vec<String>,
    /// Human-readable failure description.
    pub error: Option<String>,
}

impl ReleaseReport {
    /// Report for a published release.
    #[must_use]
    pub fn published(release: &PublishedRelease) -> Self {
        Self {
            tag: release.tag.clone(),
            published: true,
            url: release.url.clone(),
            assets: release.assets.clone(),
            error: None,
        }
    }

    /// Report for a failed release.
    #[must_use]
    pub fn failed(tag: impl Into<String>, error: &ReleaseError) -> Self {
        Self {
            tag: tag.into(),
            published: false,
            url: None,
            assets: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Complete account of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The run's identifier.
    pub run_id: RunId,
    /// The ref the trigger carried.
    pub reference: String,
    /// Branch push or tag push.
    pub trigger: TriggerKind,
    /// The state the run ended in.
    pub state: RunState,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// The cancellation reason, when cancelled.
    pub cancel_reason: Option<String>,
    /// Fingerprint of the run plan; identical refs plan identically.
    pub plan_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Wall time of the run in milliseconds.
    pub duration_ms: u64,
    /// One section per matrix entry, in matrix order.
    pub entries: Vec<EntryReport>,
    /// The release section, present only when a release was attempted.
    pub release: Option<ReleaseReport>,
}

impl RunReport {
    /// Process exit code for this run.
    ///
    /// A cancelled run froze before reaching a terminal state and reports
    /// the non-success code 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    /// True when every entry built and any wanted release was published.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state.is_success() && !self.cancelled
    }

    /// Names of the artifacts the run stored, in matrix order.
    #[must_use]
    pub fn artifact_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|entry| entry.artifact.as_ref())
            .map(|artifact| artifact.file_name.clone())
            .collect()
    }

    /// The report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_report_from_failure_keeps_message() {
        let report = ReleaseReport::failed(
            "v1.0.0",
            &ReleaseError::Incomplete {
                missing: vec!["m-linux".to_string()],
            },
        );
        assert!(!report.published);
        assert!(report.error.as_deref().is_some_and(|e| e.contains("m-linux")));
    }

    #[test]
    fn test_release_report_from_published() {
        let release = PublishedRelease {
            tag: "v1.0.0".to_string(),
            url: Some("https://example.com/v1.0.0".to_string()),
            assets: vec!["m-linux".to_string()],
        };
        let report = ReleaseReport::published(&release);
        assert!(report.published);
        assert_eq!(report.assets, vec!["m-linux"]);
        assert!(report.error.is_none());
    }
}
