//! Error types for the slipway orchestrator.
//!
//! Build-step errors are scoped to a single matrix entry and never abort the
//! run as a whole; release errors are fatal to the release stage; top-level
//! errors cover preconditions such as configuration and state handling.

use thiserror::Error;

/// Error raised when acquiring a source checkout fails.
#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// The requested ref does not exist on the source host.
    #[error("ref '{0}' not found on source host")]
    NotFound(String),

    /// Any other checkout failure.
    #[error("checkout of '{reference}' failed: {message}")]
    Failed {
        /// The ref being checked out.
        reference: String,
        /// Description of the failure.
        message: String,
    },
}

impl CheckoutError {
    /// Creates a checkout failure for a ref.
    #[must_use]
    pub fn failed(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

/// Error raised when runtime provisioning fails.
#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    /// The requested runtime version cannot be provided.
    #[error("runtime version '{0}' unavailable")]
    VersionUnavailable(String),

    /// Any other provisioning failure.
    #[error("runtime provisioning failed: {0}")]
    Failed(String),
}

/// Error raised when dependency installation fails.
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    /// The dependency set cannot be resolved as declared.
    #[error("dependency resolution failed: {0}")]
    Resolution(String),

    /// A network failure interrupted installation. Transient.
    #[error("network failure during dependency installation: {0}")]
    Network(String),
}

impl DependencyError {
    /// Returns true if retrying the installation could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Error raised when the packaging tool fails to produce the executable.
#[derive(Debug, Clone, Error)]
pub enum PackagingError {
    /// The packaging tool itself reported a failure.
    #[error("packaging failed: {0}")]
    Build(String),

    /// The tool reported success but the expected executable is absent.
    #[error("expected executable '{0}' was not produced")]
    MissingOutput(String),
}

/// Error raised when storing an artifact fails.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The store rejected or lost the artifact.
    #[error("artifact upload failed: {0}")]
    Failed(String),

    /// A network failure interrupted the upload. Transient.
    #[error("network failure during artifact upload: {0}")]
    Network(String),
}

impl UploadError {
    /// Returns true if retrying the upload could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// A failure of one build step, scoped to a single matrix entry.
///
/// Failing one entry never aborts sibling entries; the outcome is recorded
/// and the join barrier still waits for everyone.
#[derive(Debug, Clone, Error)]
pub enum BuildStepError {
    /// Checkout step failed.
    #[error("{0}")]
    Checkout(#[from] CheckoutError),

    /// Runtime provisioning step failed.
    #[error("{0}")]
    Provisioning(#[from] ProvisioningError),

    /// Dependency installation step failed.
    #[error("{0}")]
    Dependency(#[from] DependencyError),

    /// Packaging step failed.
    #[error("{0}")]
    Packaging(#[from] PackagingError),

    /// Artifact upload step failed.
    #[error("{0}")]
    Upload(#[from] UploadError),
}

impl BuildStepError {
    /// The name of the step that failed.
    #[must_use]
    pub const fn step_label(&self) -> &'static str {
        match self {
            Self::Checkout(_) => "checkout",
            Self::Provisioning(_) => "provision",
            Self::Dependency(_) => "install",
            Self::Packaging(_) => "package",
            Self::Upload(_) => "upload",
        }
    }

    /// Returns true if the failure is a transient network error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Dependency(err) => err.is_transient(),
            Self::Upload(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Error raised when collecting a run's artifacts from the store fails.
#[derive(Debug, Clone, Error)]
#[error("artifact aggregation failed: {message}")]
pub struct AggregationError {
    /// Description of the failure.
    pub message: String,
}

impl AggregationError {
    /// Creates a new aggregation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A failure of the release stage. Fatal to the release; never retried.
#[derive(Debug, Clone, Error)]
pub enum ReleaseError {
    /// Artifact aggregation failed.
    #[error("{0}")]
    Aggregation(#[from] AggregationError),

    /// One or more expected artifacts were absent at aggregation time.
    #[error("release aborted, missing expected artifacts: {}", missing.join(", "))]
    Incomplete {
        /// The artifact names that were expected but not found.
        missing: Vec<String>,
    },

    /// A release for this tag already exists on the release host.
    #[error("a release for tag '{0}' already exists")]
    TagConflict(String),

    /// The release host rejected the supplied credentials.
    #[error("release host authentication failed: {0}")]
    Auth(String),

    /// Any other release host failure.
    #[error("release host failure: {0}")]
    Host(String),
}

/// Error raised on an illegal run state transition.
#[derive(Debug, Clone, Error)]
#[error("illegal state transition: {from} -> {to}")]
pub struct StateError {
    /// The state the run was in.
    pub from: String,
    /// The state the transition attempted to reach.
    pub to: String,
}

/// Error raised when loading or validating pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config '{path}': {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("cannot parse config '{path}': {message}")]
    Parse {
        /// Path that was attempted.
        path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The configuration is structurally valid but semantically wrong.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The main error type for slipway operations.
///
/// Build and release failures are recorded in the run report, not raised;
/// this type covers everything that prevents a run from being driven at all.
#[derive(Debug, Error)]
pub enum SlipwayError {
    /// A configuration error occurred.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An illegal state transition was attempted.
    #[error("{0}")]
    State(#[from] StateError),

    /// A release-stage error escaped the run report.
    #[error("{0}")]
    Release(#[from] ReleaseError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for slipway operations.
pub type Result<T> = std::result::Result<T, SlipwayError>;
