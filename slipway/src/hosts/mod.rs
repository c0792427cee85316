//! Production implementations of the pipeline's collaborator traits.
//!
//! Source checkout, runtime probing, dependency installation, and packaging
//! are backed by external commands. Artifacts live on the filesystem and
//! releases go through the GitHub API when the `github` feature is enabled.
//! In-memory counterparts for tests live in [`crate::ports`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{PipelineConfig, ReleaseCredentials};
use crate::errors::{ReleaseError, SlipwayError};
use crate::ports::{PipelinePorts, PublishedRelease, ReleaseHost, ReleaseRequest};

mod git;
mod packager;
mod process;
mod store;
mod toolchain;

#[cfg(feature = "github")]
mod github;

pub use git::GitSourceHost;
pub use packager::CommandPackager;
pub use process::{command_line, render_argv, run_command, CommandError, CommandOutput};
pub use store::FsArtifactStore;
pub use toolchain::{CommandInstaller, CommandProvisioner};

#[cfg(feature = "github")]
pub use github::HttpReleaseHost;

/// Release host used when no repository or credentials are configured.
///
/// Every publish attempt fails, so a tag run without release settings
/// reports a release failure instead of silently skipping it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReleaseHost;

#[async_trait]
impl ReleaseHost for NullReleaseHost {
    async fn create_release(
        &self,
        request: ReleaseRequest,
    ) -> Result<PublishedRelease, ReleaseError> {
        Err(ReleaseError::Auth(format!(
            "no release host configured for tag '{}'",
            request.tag
        )))
    }
}

/// Assembles the production collaborator set for a configuration.
///
/// Explicit credentials take precedence over a token in the configuration
/// file. When the repository or credentials are absent, release publication
/// is backed by [`NullReleaseHost`].
///
/// # Errors
///
/// Returns an error when the release host cannot be constructed from the
/// given credentials.
pub fn ports_from_config(
    config: &PipelineConfig,
    credentials: Option<ReleaseCredentials>,
) -> Result<PipelinePorts, SlipwayError> {
    let timeouts = &config.timeouts;
    let source = Arc::new(
        GitSourceHost::new(&config.source.remote).with_timeout(timeouts.checkout()),
    );
    let provisioner = Arc::new(
        CommandProvisioner::new(config.commands.runtime_probe.clone())
            .with_timeout(timeouts.provision()),
    );
    let installer = Arc::new(
        CommandInstaller::new(config.commands.install.clone()).with_timeout(timeouts.install()),
    );
    let packager = Arc::new(
        CommandPackager::new(
            config.commands.package.clone(),
            config.commands.output_dir.clone(),
        )
        .with_timeout(timeouts.package()),
    );
    let store = Arc::new(FsArtifactStore::new(config.workspace_root.join("artifacts")));
    let release = release_host_from_config(config, credentials)?;

    Ok(PipelinePorts::new(
        source,
        provisioner,
        installer,
        packager,
        store,
        release,
    ))
}

fn release_host_from_config(
    config: &PipelineConfig,
    credentials: Option<ReleaseCredentials>,
) -> Result<Arc<dyn ReleaseHost>, SlipwayError> {
    #[cfg(feature = "github")]
    {
        let credentials = credentials.or_else(|| config.release.credentials());
        if let (Some(repository), Some(creds)) =
            (config.release.repository.as_deref(), credentials)
        {
            let host = HttpReleaseHost::new(&config.release.base_url, repository, &creds)?
                .with_timeout(config.timeouts.release());
            return Ok(Arc::new(host));
        }
    }
    #[cfg(not(feature = "github"))]
    let _ = credentials;

    Ok(Arc::new(NullReleaseHost))
}
