//! The injected collaborators every pipeline run is built from.
//!
//! The orchestrator never talks to git, package managers, packaging tools,
//! storage, or release APIs directly. It talks to these six traits; the
//! `hosts` module provides the production implementations and
//! [`memory`](self::memory) provides in-memory ones.

mod memory;

pub use memory::{MemoryArtifactStore, MemoryReleaseHost};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{
    AggregationError, CheckoutError, DependencyError, PackagingError, ProvisioningError,
    ReleaseError, UploadError,
};

/// Unique identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A checked-out source tree, pinned to the ref it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Root directory of the checkout.
    pub path: PathBuf,
    /// The ref the tree was checked out at.
    pub reference: String,
}

impl SourceTree {
    /// Creates a source tree handle.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, reference: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reference: reference.into(),
        }
    }
}

/// Storage key of one artifact: the run and the matrix entry that built it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// The run the artifact belongs to.
    pub run_id: RunId,
    /// The matrix entry that produced it.
    pub entry_id: String,
}

impl ArtifactKey {
    /// Creates an artifact key.
    #[must_use]
    pub fn new(run_id: RunId, entry_id: impl Into<String>) -> Self {
        Self {
            run_id,
            entry_id: entry_id.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.run_id, self.entry_id)
    }
}

/// The bytes of one built executable, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBlob {
    /// The executable file name.
    pub file_name: String,
    /// The executable contents.
    pub bytes: Vec<u8>,
}

impl ArtifactBlob {
    /// Creates a blob.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Hex-encoded sha256 digest of the contents.
    #[must_use]
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }

    /// Size of the contents in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// An artifact as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// The matrix entry that produced it.
    pub entry_id: String,
    /// The executable file name.
    pub file_name: String,
    /// Hex-encoded sha256 digest recorded at upload time.
    pub sha256: String,
    /// The executable contents.
    pub bytes: Vec<u8>,
}

impl StoredArtifact {
    /// Size of the contents in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// True when the recorded digest still matches the bytes.
    #[must_use]
    pub fn digest_matches(&self) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize()) == self.sha256
    }
}

/// One asset to attach to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// The asset file name.
    pub file_name: String,
    /// The asset contents.
    pub bytes: Vec<u8>,
}

impl ReleaseAsset {
    /// Creates a release asset.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// A request to publish one release with all its assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    /// The tag being released.
    pub tag: String,
    /// Human-readable release title.
    pub title: String,
    /// The assets to attach, all-or-nothing.
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseRequest {
    /// Creates a request titled after the tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            title: tag.clone(),
            tag,
            assets: Vec::new(),
        }
    }

    /// Sets the release title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Adds one asset.
    #[must_use]
    pub fn with_asset(mut self, asset: ReleaseAsset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Adds many assets.
    #[must_use]
    pub fn with_assets(mut self, assets: impl IntoIterator<Item = ReleaseAsset>) -> Self {
        self.assets.extend(assets);
        self
    }
}

/// A release as confirmed by the release host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRelease {
    /// The released tag.
    pub tag: String,
    /// Where the release can be viewed, if the host reports it.
    pub url: Option<String>,
    /// Names of the published assets.
    pub assets: Vec<String>,
}

/// Provides clean source checkouts at exact refs.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Checks out `reference` into `dest`, which must not already contain a
    /// checkout. Returns [`CheckoutError::NotFound`] for unknown refs.
    async fn checkout(&self, reference: &str, dest: &Path) -> Result<SourceTree, CheckoutError>;
}

/// Makes a runtime of a specific version available for a build.
#[async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    /// Ensures `version` of the runtime is usable, or fails with
    /// [`ProvisioningError::VersionUnavailable`].
    async fn provision(&self, version: &str) -> Result<(), ProvisioningError>;
}

/// Installs the project's declared dependencies into a checkout.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Installs from the manifest at `manifest` (relative to the tree root).
    async fn install(&self, tree: &SourceTree, manifest: &Path) -> Result<(), DependencyError>;
}

/// Packages a checkout into a single executable.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Builds `entry_point` into one executable named `artifact_name` and
    /// returns its path. Reporting success without producing the file is a
    /// [`PackagingError::MissingOutput`].
    async fn package(
        &self,
        tree: &SourceTree,
        entry_point: &Path,
        artifact_name: &str,
    ) -> Result<PathBuf, PackagingError>;
}

/// Key-value artifact storage shared by a run's entries.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores one blob under its key, replacing any previous value.
    async fn put(&self, key: &ArtifactKey, blob: ArtifactBlob) -> Result<(), UploadError>;

    /// Returns every artifact stored for the run, in entry-id order.
    async fn get_all(&self, run_id: RunId) -> Result<Vec<StoredArtifact>, AggregationError>;
}

/// Publishes releases on the release host.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Creates one release for the request's tag carrying all its assets.
    /// Must not leave a partial release visible on failure.
    async fn create_release(
        &self,
        request: ReleaseRequest,
    ) -> Result<PublishedRelease, ReleaseError>;
}

/// The full set of collaborators a pipeline run needs.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Source control host.
    pub source: Arc<dyn SourceHost>,
    /// Runtime provisioner.
    pub provisioner: Arc<dyn RuntimeProvisioner>,
    /// Dependency installer.
    pub installer: Arc<dyn DependencyInstaller>,
    /// Packaging tool.
    pub packager: Arc<dyn Packager>,
    /// Artifact store.
    pub store: Arc<dyn ArtifactStore>,
    /// Release host.
    pub release: Arc<dyn ReleaseHost>,
}

impl PipelinePorts {
    /// Bundles the six collaborators.
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceHost>,
        provisioner: Arc<dyn RuntimeProvisioner>,
        installer: Arc<dyn DependencyInstaller>,
        packager: Arc<dyn Packager>,
        store: Arc<dyn ArtifactStore>,
        release: Arc<dyn ReleaseHost>,
    ) -> Self {
        Self {
            source,
            provisioner,
            installer,
            packager,
            store,
            release,
        }
    }
}

impl fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePorts").finish_non_exhaustive()
    }
}
