//! # Slipway
//!
//! A minimal cross-platform build-and-release pipeline orchestrator.
//!
//! Slipway turns one trigger event (a push to a branch or tag) into a full
//! pipeline run:
//!
//! - **Matrix builds**: a fixed build matrix fans out, one entry per target
//!   platform, each packaging the project into a single executable
//! - **Join barrier**: the run waits for every entry before deciding anything
//! - **Conditional release**: a release is published only for tag refs, and
//!   only when every matrix entry succeeded
//! - **Injected collaborators**: source host, runtime provisioner, dependency
//!   installer, packaging tool, artifact store, and release host are all
//!   trait objects supplied by the caller
//! - **Cancellation handling**: cancelling the orchestrator cancels every
//!   in-flight entry and forbids a partial release
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use slipway::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let orchestrator = PipelineOrchestrator::new(config, ports)?;
//!
//! let report = orchestrator.run(TriggerEvent::tag("v1.2.0")).await?;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod hosts;
pub mod matrix;
pub mod observability;
pub mod ports;
pub mod retry;
pub mod run;
pub mod testing;
pub mod trigger;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        CommandsConfig, PipelineConfig, ProjectConfig, ReleaseConfig,
        ReleaseCredentials, SourceConfig, StepTimeouts,
    };
    pub use crate::errors::{
        AggregationError, BuildStepError, CheckoutError, DependencyError,
        PackagingError, ProvisioningError, ReleaseError, SlipwayError,
        UploadError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
        RunEvent,
    };
    pub use crate::matrix::{BuildMatrix, MatrixEntry, Platform};
    pub use crate::ports::{
        ArtifactBlob, ArtifactKey, ArtifactStore, DependencyInstaller,
        Packager, PipelinePorts, PublishedRelease, ReleaseAsset,
        ReleaseHost, ReleaseRequest, RuntimeProvisioner, RunId, SourceHost,
        SourceTree, StoredArtifact,
    };
    pub use crate::retry::{BackoffStrategy, JitterStrategy, RetryConfig};
    pub use crate::run::{
        BuildStep, EntryOutcome, EntryStatus, PipelineOrchestrator,
        ReleaseStage, RunPlan, RunReport, RunState,
    };
    pub use crate::trigger::{is_release_trigger, TagPattern, TriggerEvent, TriggerKind};
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
