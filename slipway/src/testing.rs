//! Test doubles for exercising pipelines without git, a runtime, or a
//! release host.
//!
//! Every double implements one collaborator trait over plain memory (plus a
//! scratch directory for checkouts and packaged files) and keeps counters
//! so tests can assert how the orchestrator drove it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{
    AggregationError, CheckoutError, DependencyError, PackagingError, ProvisioningError,
    ReleaseError, UploadError,
};
use crate::ports::{
    ArtifactBlob, ArtifactKey, ArtifactStore, DependencyInstaller, MemoryArtifactStore,
    MemoryReleaseHost, Packager, PipelinePorts, PublishedRelease, ReleaseHost, ReleaseRequest,
    RunId, RuntimeProvisioner, SourceHost, SourceTree, StoredArtifact,
};

/// Source host that materializes an empty checkout for any accepted
/// revision.
#[derive(Debug, Default)]
pub struct StaticSourceHost {
    known_refs: Option<Vec<String>>,
    calls: AtomicUsize,
}

impl StaticSourceHost {
    /// Accepts every revision.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only the given revisions; everything else is not found.
    #[must_use]
    pub fn with_known_refs(refs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            known_refs: Some(refs.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of checkout calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceHost for StaticSourceHost {
    async fn checkout(&self, reference: &str, dest: &Path) -> Result<SourceTree, CheckoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(known) = &self.known_refs {
            if !known.iter().any(|r| r == reference) {
                return Err(CheckoutError::NotFound(reference.to_string()));
            }
        }
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| CheckoutError::failed(reference, e.to_string()))?;
        Ok(SourceTree::new(dest, reference))
    }
}

/// Provisioner that accepts every version, or only a fixed set.
#[derive(Debug, Default)]
pub struct StaticProvisioner {
    available: Option<Vec<String>>,
}

impl StaticProvisioner {
    /// Accepts every version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts only the given versions.
    #[must_use]
    pub fn with_available(versions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            available: Some(versions.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl RuntimeProvisioner for StaticProvisioner {
    async fn provision(&self, version: &str) -> Result<(), ProvisioningError> {
        match &self.available {
            Some(available) if !available.iter().any(|v| v == version) => {
                Err(ProvisioningError::VersionUnavailable(version.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Installer that fails a scripted number of times before succeeding.
#[derive(Debug)]
pub struct FlakyInstaller {
    remaining_failures: AtomicUsize,
    transient: bool,
    calls: AtomicUsize,
}

impl FlakyInstaller {
    /// Always succeeds.
    #[must_use]
    pub const fn succeeding() -> Self {
        Self {
            remaining_failures: AtomicUsize::new(0),
            transient: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with a network error the first `failures` times.
    #[must_use]
    pub const fn network_flaky(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            transient: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with a resolution error.
    #[must_use]
    pub const fn resolution_failure() -> Self {
        Self {
            remaining_failures: AtomicUsize::new(usize::MAX),
            transient: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of install calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DependencyInstaller for FlakyInstaller {
    async fn install(&self, _tree: &SourceTree, _manifest: &Path) -> Result<(), DependencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(n),
                _ => Some(n - 1),
            })
            .is_ok();

        if fail {
            if self.transient {
                Err(DependencyError::Network(
                    "scripted network failure".to_string(),
                ))
            } else {
                Err(DependencyError::Resolution(
                    "scripted resolution failure".to_string(),
                ))
            }
        } else {
            Ok(())
        }
    }
}

/// Packager writing deterministic bytes, with scripted misbehavior per
/// artifact name.
#[derive(Debug, Default)]
pub struct ScriptedPackager {
    failures: Vec<String>,
    phantom: Vec<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedPackager {
    /// Packages every artifact.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails packaging for the given artifact name.
    #[must_use]
    pub fn with_failure(mut self, artifact_name: impl Into<String>) -> Self {
        self.failures.push(artifact_name.into());
        self
    }

    /// Reports success for the given artifact name without writing a file.
    #[must_use]
    pub fn with_phantom_output(mut self, artifact_name: impl Into<String>) -> Self {
        self.phantom.push(artifact_name.into());
        self
    }

    /// Sleeps before packaging, leaving a window for cancellation.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of package calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Packager for ScriptedPackager {
    async fn package(
        &self,
        tree: &SourceTree,
        _entry_point: &Path,
        artifact_name: &str,
    ) -> Result<PathBuf, PackagingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.iter().any(|name| name == artifact_name) {
            return Err(PackagingError::Build(format!(
                "scripted failure for '{artifact_name}'"
            )));
        }

        let dist = tree.path.join("dist");
        let path = dist.join(artifact_name);
        if self.phantom.iter().any(|name| name == artifact_name) {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&dist)
            .await
            .map_err(|e| PackagingError::Build(e.to_string()))?;
        let contents = format!("{artifact_name} built from {}\n", tree.reference);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| PackagingError::Build(e.to_string()))?;
        Ok(path)
    }
}

/// Store that loses one entry's artifact between upload and aggregation.
#[derive(Debug)]
pub struct LossyArtifactStore {
    inner: MemoryArtifactStore,
    lost_entry: String,
}

impl LossyArtifactStore {
    /// Accepts every upload but never returns the given entry's artifact.
    #[must_use]
    pub fn losing(entry_id: impl Into<String>) -> Self {
        Self {
            inner: MemoryArtifactStore::new(),
            lost_entry: entry_id.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for LossyArtifactStore {
    async fn put(&self, key: &ArtifactKey, blob: ArtifactBlob) -> Result<(), UploadError> {
        self.inner.put(key, blob).await
    }

    async fn get_all(&self, run_id: RunId) -> Result<Vec<StoredArtifact>, AggregationError> {
        let mut artifacts = self.inner.get_all(run_id).await?;
        artifacts.retain(|artifact| artifact.entry_id != self.lost_entry);
        Ok(artifacts)
    }
}

/// Release host that counts publish attempts and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingReleaseHost {
    inner: MemoryReleaseHost,
    fail_with: Option<ReleaseError>,
    calls: AtomicUsize,
}

impl RecordingReleaseHost {
    /// Publishes every release into memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every publish attempt with the given error.
    #[must_use]
    pub fn failing_with(error: ReleaseError) -> Self {
        Self {
            inner: MemoryReleaseHost::new(),
            fail_with: Some(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of publish attempts observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The release published for `tag`, if any.
    #[must_use]
    pub fn released(&self, tag: &str) -> Option<PublishedRelease> {
        self.inner.released(tag)
    }
}

#[async_trait]
impl ReleaseHost for RecordingReleaseHost {
    async fn create_release(
        &self,
        request: ReleaseRequest,
    ) -> Result<PublishedRelease, ReleaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.inner.create_release(request).await
    }
}

/// A full set of in-memory collaborators with handles kept for assertions.
///
/// Swap any field before calling [`TestPorts::ports`] to script a failure:
///
/// ```rust
/// use slipway::testing::{ScriptedPackager, TestPorts};
/// use std::sync::Arc;
///
/// let mut doubles = TestPorts::new();
/// doubles.packager = Arc::new(ScriptedPackager::new().with_failure("m-linux"));
/// let ports = doubles.ports();
/// ```
#[derive(Debug, Clone)]
pub struct TestPorts {
    /// Checkout double.
    pub source: Arc<StaticSourceHost>,
    /// Provisioning double.
    pub provisioner: Arc<StaticProvisioner>,
    /// Installation double.
    pub installer: Arc<FlakyInstaller>,
    /// Packaging double.
    pub packager: Arc<ScriptedPackager>,
    /// Artifact store double.
    pub store: Arc<MemoryArtifactStore>,
    /// Release host double.
    pub release: Arc<RecordingReleaseHost>,
}

impl TestPorts {
    /// Doubles that let every step succeed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Arc::new(StaticSourceHost::new()),
            provisioner: Arc::new(StaticProvisioner::new()),
            installer: Arc::new(FlakyInstaller::succeeding()),
            packager: Arc::new(ScriptedPackager::new()),
            store: Arc::new(MemoryArtifactStore::new()),
            release: Arc::new(RecordingReleaseHost::new()),
        }
    }

    /// Bundles the doubles for the orchestrator.
    #[must_use]
    pub fn ports(&self) -> PipelinePorts {
        PipelinePorts::new(
            self.source.clone(),
            self.provisioner.clone(),
            self.installer.clone(),
            self.packager.clone(),
            self.store.clone(),
            self.release.clone(),
        )
    }
}

impl Default for TestPorts {
    fn default() -> Self {
        Self::new()
    }
}
