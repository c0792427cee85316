//! Packaging backed by a configured command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::process::{render_argv, run_command, CommandError};
use crate::errors::PackagingError;
use crate::ports::{Packager, SourceTree};

const DEFAULT_PACKAGE_TIMEOUT: Duration = Duration::from_secs(900);

/// Packages a checkout into a single executable by running a configured
/// command inside it.
///
/// The command template may reference `{entry_point}` and `{output}`. A run
/// only counts as successful if the expected file actually exists under the
/// output directory afterwards; tools sometimes exit zero without producing
/// one.
#[derive(Debug, Clone)]
pub struct CommandPackager {
    package: Vec<String>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl CommandPackager {
    /// Creates a packager around a command template and output directory.
    pub fn new(package: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            package,
            output_dir: output_dir.into(),
            timeout: DEFAULT_PACKAGE_TIMEOUT,
        }
    }

    /// Sets the packaging time limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
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
impl Packager for CommandPackager {
    async fn package(
        &self,
        tree: &SourceTree,
        entry_point: &Path,
        artifact_name: &str,
    ) -> Result<PathBuf, PackagingError> {
        let argv = render_argv(
            &self.package,
            &[
                ("entry_point", &entry_point.to_string_lossy()),
                ("output", artifact_name),
            ],
        );

        run_command(&argv, Some(&tree.path), self.timeout)
            .await
            .map_err(|e| PackagingError::Build(describe(&e)))?;

        let produced = tree.path.join(&self.output_dir).join(artifact_name);
        match tokio::fs::metadata(&produced).await {
            Ok(meta) if meta.is_file() => {
                tracing::debug!(artifact = artifact_name, path = %produced.display(), "packaged");
                Ok(produced)
            }
            _ => Err(PackagingError::MissingOutput(artifact_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    fn tree_with_entry_point() -> (tempfile::TempDir, SourceTree) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), b"print('hi')\n").unwrap();
        let tree = SourceTree::new(dir.path(), "main");
        (dir, tree)
    }

    #[tokio::test]
    async fn test_package_produces_expected_file() {
        let (_dir, tree) = tree_with_entry_point();
        let packager = CommandPackager::new(
            argv(&["sh", "-c", "mkdir -p dist && cp {entry_point} dist/{output}"]),
            "dist",
        );

        let path = packager
            .package(&tree, Path::new("app.py"), "tool-linux")
            .await
            .unwrap();
        assert!(path.ends_with("dist/tool-linux"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_package_command_failure_is_build_error() {
        let (_dir, tree) = tree_with_entry_point();
        let packager = CommandPackager::new(
            argv(&["sh", "-c", "echo 'syntax error in spec file' >&2; exit 3"]),
            "dist",
        );

        let err = packager
            .package(&tree, Path::new("app.py"), "tool-linux")
            .await
            .unwrap_err();
        match err {
            PackagingError::Build(message) => assert!(message.contains("syntax error")),
            other => panic!("expected build error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_package_without_output_file_is_missing_output() {
        let (_dir, tree) = tree_with_entry_point();
        let packager = CommandPackager::new(argv(&["true"]), "dist");

        let err = packager
            .package(&tree, Path::new("app.py"), "tool-linux")
            .await
            .unwrap_err();
        assert!(matches!(err, PackagingError::MissingOutput(_)));
    }
}
