//! Runtime and dependency provisioning backed by configured commands.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::process::{command_line, render_argv, run_command, CommandError};
use crate::errors::{DependencyError, ProvisioningError};
use crate::ports::{DependencyInstaller, RuntimeProvisioner, SourceTree};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Verifies a runtime by probing it and matching the reported version.
///
/// The probe template may reference `{version}`. The requested version must
/// appear in the probe's combined output; a probe that cannot even start
/// means the runtime is absent.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    probe: Vec<String>,
    timeout: Duration,
}

impl CommandProvisioner {
    /// Creates a provisioner around a probe command template.
    #[must_use]
    pub const fn new(probe: Vec<String>) -> Self {
        Self {
            probe,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Sets the probe time limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RuntimeProvisioner for CommandProvisioner {
    async fn provision(&self, version: &str) -> Result<(), ProvisioningError> {
        let argv = render_argv(&self.probe, &[("version", version)]);
        match run_command(&argv, None, self.timeout).await {
            Ok(output) => {
                let combined = format!("{}{}", output.stdout, output.stderr);
                if combined.contains(version) {
                    tracing::debug!(version, probe = %command_line(&argv), "runtime available");
                    Ok(())
                } else {
                    Err(ProvisioningError::VersionUnavailable(format!(
                        "requested {version}, probe reported: {}",
                        combined.trim()
                    )))
                }
            }
            Err(CommandError::Spawn { .. }) => {
                Err(ProvisioningError::VersionUnavailable(version.to_string()))
            }
            Err(e) => Err(ProvisioningError::Failed(e.to_string())),
        }
    }
}

/// Installs dependencies by running a configured command inside the checkout.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    install: Vec<String>,
    timeout: Duration,
}

impl CommandInstaller {
    /// Creates an installer around an install command template.
    #[must_use]
    pub const fn new(install: Vec<String>) -> Self {
        Self {
            install,
            timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    /// Sets the install time limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Returns true when installer stderr points at a network problem rather
/// than an unresolvable dependency set.
fn is_network_failure(stderr: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "connection",
        "network",
        "timed out",
        "temporary failure",
        "unreachable",
        "proxy error",
    ];
    let lowered = stderr.to_lowercase();
    MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    async fn install(&self, tree: &SourceTree, manifest: &Path) -> Result<(), DependencyError> {
        let manifest_path = tree.path.join(manifest);
        if !manifest_path.exists() {
            return Err(DependencyError::Resolution(format!(
                "manifest '{}' not found in checkout",
                manifest.display()
            )));
        }

        let argv = render_argv(
            &self.install,
            &[("manifest", &manifest.to_string_lossy())],
        );
        match run_command(&argv, Some(&tree.path), self.timeout).await {
            Ok(_) => {
                tracing::debug!(manifest = %manifest.display(), "dependencies installed");
                Ok(())
            }
            Err(CommandError::Timeout { .. }) => Err(DependencyError::Network(format!(
                "install timed out after {}s",
                self.timeout.as_secs()
            ))),
            Err(CommandError::Spawn { command, message }) => Err(DependencyError::Resolution(
                format!("failed to run '{command}': {message}"),
            )),
            Err(CommandError::Exit { stderr, .. }) => {
                let message = stderr.trim().to_string();
                if is_network_failure(&stderr) {
                    Err(DependencyError::Network(message))
                } else {
                    Err(DependencyError::Resolution(message))
                }
            }
        }
    }
}
