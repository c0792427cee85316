//! Source checkout backed by the `git` command line tool.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::process::{run_command, CommandError};
use crate::errors::CheckoutError;
use crate::ports::{SourceHost, SourceTree};

/// Default time limit for a single git operation.
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Fetches source trees by cloning a git remote and checking out a revision.
///
/// The checkout is detached so branch names, tag names, and commit ids all
/// behave identically.
#[derive(Debug, Clone)]
pub struct GitSourceHost {
    /// Clone URL or local path of the repository.
    remote: String,
    /// Time limit applied to each git invocation.
    timeout: Duration,
}

impl GitSourceHost {
    /// Creates a source host for the given remote.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Sets the time limit for each git invocation.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured remote.
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }
}

/// Returns true when git stderr indicates the requested revision does not exist.
fn is_unknown_revision(stderr: &str) -> bool {
    const MARKERS: [&str; 4] = [
        "did not match any",
        "unknown revision",
        "not a tree",
        "couldn't find remote ref",
    ];
    MARKERS.iter().any(|marker| stderr.contains(marker))
}

/// Condenses a command failure into a single-line message.
fn describe(err: &CommandError) -> String {
    let stderr = err.stderr().trim();
    if stderr.is_empty() {
        err.to_string()
    } else {
        stderr.to_string()
    }
}

#[async_trait]
impl SourceHost for GitSourceHost {
    async fn checkout(&self, reference: &str, dest: &Path) -> Result<SourceTree, CheckoutError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CheckoutError::failed(reference, e.to_string()))?;
        }

        let dest_str = dest.to_string_lossy().to_string();
        let clone_argv = vec![
            "git".to_string(),
            "clone".to_string(),
            "--quiet".to_string(),
            self.remote.clone(),
            dest_str.clone(),
        ];
        run_command(&clone_argv, None, self.timeout)
            .await
            .map_err(|e| CheckoutError::failed(reference, describe(&e)))?;

        let checkout_argv = vec![
            "git".to_string(),
            "-C".to_string(),
            dest_str,
            "checkout".to_string(),
            "--quiet".to_string(),
            "--detach".to_string(),
            reference.to_string(),
        ];
        if let Err(e) = run_command(&checkout_argv, None, self.timeout).await {
            if is_unknown_revision(e.stderr()) {
                return Err(CheckoutError::NotFound(reference.to_string()));
            }
            return Err(CheckoutError::failed(reference, describe(&e)));
        }

        tracing::debug!(reference, dest = %dest.display(), "checked out source tree");
        Ok(SourceTree::new(dest, reference))
    }
}
