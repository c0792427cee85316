//! In-memory collaborator implementations.
//!
//! Useful for tests and for embedders that want pipeline semantics without
//! real storage or a real release host.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    ArtifactBlob, ArtifactKey, ArtifactStore, PublishedRelease, ReleaseHost, ReleaseRequest,
    RunId, StoredArtifact,
};
use crate::errors::{AggregationError, ReleaseError, UploadError};

/// An artifact store backed by a concurrent in-memory map.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<ArtifactKey, StoredArtifact>,
}

impl MemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts across all runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &ArtifactKey, blob: ArtifactBlob) -> Result<(), UploadError> {
        let stored = StoredArtifact {
            entry_id: key.entry_id.clone(),
            file_name: blob.file_name.clone(),
            sha256: blob.sha256(),
            bytes: blob.bytes,
        };
        self.artifacts.insert(key.clone(), stored);
        Ok(())
    }

    async fn get_all(&self, run_id: RunId) -> Result<Vec<StoredArtifact>, AggregationError> {
        let mut found: Vec<StoredArtifact> = self
            .artifacts
            .iter()
            .filter(|entry| entry.key().run_id == run_id)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        Ok(found)
    }
}

/// A release host backed by a concurrent in-memory map, keyed by tag.
#[derive(Debug, Default)]
pub struct MemoryReleaseHost {
    releases: DashMap<String, PublishedRelease>,
}

impl MemoryReleaseHost {
    /// Creates a host with no releases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the release published for `tag`, if any.
    #[must_use]
    pub fn released(&self, tag: &str) -> Option<PublishedRelease> {
        self.releases.get(tag).map(|entry| entry.value().clone())
    }

    /// Number of published releases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Returns true if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

#[async_trait]
impl ReleaseHost for MemoryReleaseHost {
    async fn create_release(
        &self,
        request: ReleaseRequest,
    ) -> Result<PublishedRelease, ReleaseError> {
        match self.releases.entry(request.tag.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ReleaseError::TagConflict(request.tag))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let published = PublishedRelease {
                    tag: request.tag.clone(),
                    url: None,
                    assets: request
                        .assets
                        .iter()
                        .map(|asset| asset.file_name.clone())
                        .collect(),
                };
                slot.insert(published.clone());
                Ok(published)
            }
        }
    }
}
