//! Release stage: aggregate artifacts, refuse partial sets, publish once.

use std::fmt;
use std::sync::Arc;

use crate::errors::{AggregationError, ReleaseError};
use crate::matrix::BuildMatrix;
use crate::ports::{ArtifactStore, PublishedRelease, ReleaseAsset, ReleaseHost, ReleaseRequest};

use super::RunContext;

/// Publishes one release per run with every expected artifact attached.
///
/// Aggregation is fail-closed: when any expected artifact is absent from
/// the store, or its digest no longer matches its bytes, the release is
/// aborted before the host is contacted. No partial release can exist.
#[derive(Clone)]
pub struct ReleaseStage {
    store: Arc<dyn ArtifactStore>,
    host: Arc<dyn ReleaseHost>,
}

impl fmt::Debug for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseStage").finish_non_exhaustive()
    }
}

impl ReleaseStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, host: Arc<dyn ReleaseHost>) -> Self {
        Self { store, host }
    }

    /// Aggregates the run's artifacts and publishes them under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Incomplete`] naming every expected artifact
    /// the store could not produce, [`ReleaseError::Aggregation`] when the
    /// store fails or a digest does not match, and the host's own error for
    /// publication failures.
    pub async fn run(
        &self,
        ctx: &RunContext,
        tag: &str,
        matrix: &BuildMatrix,
    ) -> Result<PublishedRelease, ReleaseError> {
        let stored = self.store.get_all(ctx.run_id).await?;

        let expected = matrix.expected_artifacts();
        let missing: Vec<String> = expected
            .iter()
            .filter(|name| !stored.iter().any(|artifact| &artifact.file_name == *name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::error!(tag, missing = ?missing, "release aborted, artifact set incomplete");
            return Err(ReleaseError::Incomplete { missing });
        }

        for artifact in &stored {
            if !artifact.digest_matches() {
                return Err(AggregationError::new(format!(
                    "digest mismatch for '{}'",
                    artifact.file_name
                ))
                .into());
            }
        }

        let assets: Vec<ReleaseAsset> = expected
            .iter()
            .filter_map(|name| stored.iter().find(|artifact| &artifact.file_name == name))
            .map(|artifact| ReleaseAsset::new(artifact.file_name.clone(), artifact.bytes.clone()))
            .collect();

        tracing::info!(tag, assets = assets.len(), "publishing release");
        let request = ReleaseRequest::new(tag).with_assets(assets);
        self.host.create_release(request).await
    }
}
