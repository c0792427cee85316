//! Filesystem-backed artifact store.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::{AggregationError, UploadError};
use crate::ports::{ArtifactBlob, ArtifactKey, ArtifactStore, RunId, StoredArtifact};

/// Stores artifacts on disk under `root/<run id>/<entry id>/`.
///
/// Each artifact is written next to a `.sha256` sidecar recording its digest
/// at upload time. Retrieval re-hashes the bytes and refuses to return an
/// artifact whose sidecar is missing or whose digest no longer matches.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn entry_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root
            .join(key.run_id.to_string())
            .join(&key.entry_id)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &ArtifactKey, blob: ArtifactBlob) -> Result<(), UploadError> {
        let dir = self.entry_dir(key);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| UploadError::Failed(e.to_string()))?;
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        let digest = blob.sha256();
        tokio::fs::write(dir.join(&blob.file_name), &blob.bytes)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;
        tokio::fs::write(dir.join(format!("{}.sha256", blob.file_name)), &digest)
            .await
            .map_err(|e| UploadError::Failed(e.to_string()))?;

        tracing::debug!(key = %key, file = %blob.file_name, "artifact stored");
        Ok(())
    }

    async fn get_all(&self, run_id: RunId) -> Result<Vec<StoredArtifact>, AggregationError> {
        let run_dir = self.root.join(run_id.to_string());
        if !run_dir.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        let mut run_entries = tokio::fs::read_dir(&run_dir)
            .await
            .map_err(|e| AggregationError::new(e.to_string()))?;

        while let Some(entry) = run_entries
            .next_entry()
            .await
            .map_err(|e| AggregationError::new(e.to_string()))?
        {
            let entry_id = entry.file_name().to_string_lossy().to_string();
            let entry_path = entry.path();
            if !entry_path.is_dir() {
                continue;
            }

            let mut file_names = Vec::new();
            let mut files = tokio::fs::read_dir(&entry_path)
                .await
                .map_err(|e| AggregationError::new(e.to_string()))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| AggregationError::new(e.to_string()))?
            {
                let name = file.file_name().to_string_lossy().to_string();
                if !name.ends_with(".sha256") {
                    file_names.push(name);
                }
            }

            let [file_name] = file_names.as_slice() else {
                return Err(AggregationError::new(format!(
                    "entry '{entry_id}' holds {} artifact files, expected exactly one",
                    file_names.len()
                )));
            };

            let bytes = tokio::fs::read(entry_path.join(file_name))
                .await
                .map_err(|e| AggregationError::new(e.to_string()))?;
            let recorded = tokio::fs::read_to_string(entry_path.join(format!(
                "{file_name}.sha256"
            )))
            .await
            .map_err(|_| {
                AggregationError::new(format!("entry '{entry_id}' is missing its digest sidecar"))
            })?;

            let blob = ArtifactBlob::new(file_name.clone(), bytes);
            let computed = blob.sha256();
            if computed != recorded.trim() {
                return Err(AggregationError::new(format!(
                    "digest mismatch for entry '{entry_id}': stored {}, computed {computed}",
                    recorded.trim()
                )));
            }

            artifacts.push(StoredArtifact {
                entry_id,
                file_name: blob.file_name,
                sha256: computed,
                bytes: blob.bytes,
            });
        }

        artifacts.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(name: &str, bytes: &[u8]) -> ArtifactBlob {
        ArtifactBlob::new(name, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_put_and_get_all_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::new();

        let payload = blob("tool-linux", b"binary bytes");
        let expected_digest = payload.sha256();
        store
            .put(&ArtifactKey::new(run_id, "linux"), payload)
            .await
            .unwrap();

        let artifacts = store.get_all(run_id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].entry_id, "linux");
        assert_eq!(artifacts[0].file_name, "tool-linux");
        assert_eq!(artifacts[0].sha256, expected_digest);
        assert_eq!(artifacts[0].bytes, b"binary bytes");
    }

    #[tokio::test]
    async fn test_get_all_unknown_run_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        assert!(store.get_all(RunId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_sorted_by_entry_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::new();

        store
            .put(&ArtifactKey::new(run_id, "windows"), blob("t.exe", b"w"))
            .await
            .unwrap();
        store
            .put(&ArtifactKey::new(run_id, "linux"), blob("t", b"l"))
            .await
            .unwrap();

        let artifacts = store.get_all(run_id).await.unwrap();
        let ids: Vec<_> = artifacts.iter().map(|a| a.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["linux", "windows"]);
    }

    #[tokio::test]
    async fn test_put_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::new();
        let key = ArtifactKey::new(run_id, "linux");

        store.put(&key, blob("old-name", b"v1")).await.unwrap();
        store.put(&key, blob("new-name", b"v2")).await.unwrap();

        let artifacts = store.get_all(run_id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "new-name");
        assert_eq!(artifacts[0].bytes, b"v2");
    }

    #[tokio::test]
    async fn test_tampered_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::new();
        let key = ArtifactKey::new(run_id, "linux");

        store.put(&key, blob("tool-linux", b"original")).await.unwrap();
        let artifact_path = dir
            .path()
            .join(run_id.to_string())
            .join("linux")
            .join("tool-linux");
        std::fs::write(&artifact_path, b"tampered").unwrap();

        let err = store.get_all(run_id).await.unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let run_id = RunId::new();
        let key = ArtifactKey::new(run_id, "linux");

        store.put(&key, blob("tool-linux", b"bytes")).await.unwrap();
        let sidecar = dir
            .path()
            .join(run_id.to_string())
            .join("linux")
            .join("tool-linux.sha256");
        std::fs::remove_file(&sidecar).unwrap();

        let err = store.get_all(run_id).await.unwrap_err();
        assert!(err.to_string().contains("sidecar"));
    }
}
