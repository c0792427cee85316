//! Pipeline configuration.
//!
//! Loaded from `slipway.toml` (JSON accepted by extension). Every field has
//! a default, so an empty file, or no file at all, is a valid starting
//! point. Credentials are plain values handed to the release host at
//! construction; the library never reads them from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::matrix::{BuildMatrix, MatrixEntry};
use crate::retry::RetryConfig;
use crate::trigger::{TagPattern, DEFAULT_TAG_PATTERN};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// The project being built.
    pub project: ProjectConfig,
    /// Where the source lives.
    pub source: SourceConfig,
    /// Explicit matrix entries. When absent, the standard three-platform
    /// matrix for the project name is used.
    pub matrix: Option<Vec<MatrixEntry>>,
    /// Commands the process-backed collaborators run.
    pub commands: CommandsConfig,
    /// Release stage settings.
    pub release: ReleaseConfig,
    /// Retry policy for transient build-step failures.
    pub retry: RetryConfig,
    /// Per-step timeouts.
    pub timeouts: StepTimeouts,
    /// Directory that holds per-run, per-entry working directories.
    pub workspace_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            source: SourceConfig::default(),
            matrix: None,
            commands: CommandsConfig::default(),
            release: ReleaseConfig::default(),
            retry: RetryConfig::default(),
            timeouts: StepTimeouts::default(),
            workspace_root: PathBuf::from(".slipway"),
        }
    }
}

/// The project a pipeline builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Base name; artifact names derive from it.
    pub name: String,
    /// The entry point handed to the packaging tool.
    pub entry_point: PathBuf,
    /// Runtime version the provisioner must supply.
    pub runtime_version: String,
    /// Dependency manifest, relative to the checkout root.
    pub manifest: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "m".to_string(),
            entry_point: PathBuf::from("m/cli.py"),
            runtime_version: "3.11".to_string(),
            manifest: PathBuf::from("requirements.txt"),
        }
    }
}

/// Where to fetch source from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Remote URL or local path handed to the source host.
    pub remote: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            remote: ".".to_string(),
        }
    }
}

/// Argv templates for the process-backed collaborators.
///
/// Templates may use `{version}`, `{manifest}`, `{entry_point}` and
/// `{output}` placeholders; each is substituted per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Probe whose output must mention the runtime version.
    pub runtime_probe: Vec<String>,
    /// Dependency installation command, run inside the checkout.
    pub install: Vec<String>,
    /// Packaging command, run inside the checkout.
    pub package: Vec<String>,
    /// Directory (relative to the checkout) where the packaging tool
    /// leaves its output.
    pub output_dir: PathBuf,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            runtime_probe: vec!["python3".into(), "--version".into()],
            install: vec![
                "python3".into(),
                "-m".into(),
                "pip".into(),
                "install".into(),
                "-r".into(),
                "{manifest}".into(),
            ],
            package: vec![
                "pyinstaller".into(),
                "--onefile".into(),
                "--name".into(),
                "{output}".into(),
                "{entry_point}".into(),
            ],
            output_dir: PathBuf::from("dist"),
        }
    }
}

/// Release stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Pattern a tag ref must match to trigger a release.
    pub tag_pattern: String,
    /// Repository the release is created in, `owner/repo`.
    pub repository: Option<String>,
    /// Release host API base URL.
    pub base_url: String,
    /// API token. Usually injected by the caller instead of written here.
    pub token: Option<String>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            tag_pattern: DEFAULT_TAG_PATTERN.to_string(),
            repository: None,
            base_url: "https://api.github.com".to_string(),
            token: None,
        }
    }
}

impl ReleaseConfig {
    /// Compiles the configured tag pattern.
    pub fn compiled_pattern(&self) -> Result<TagPattern, ConfigError> {
        TagPattern::new(&self.tag_pattern)
    }

    /// Credentials from the configured token, if one is set.
    #[must_use]
    pub fn credentials(&self) -> Option<ReleaseCredentials> {
        self.token.as_deref().map(ReleaseCredentials::new)
    }
}

/// Explicit credentials for the release host.
///
/// Constructed by the caller and injected; never read from ambient
/// environment variables inside the library.
#[derive(Clone, PartialEq, Eq)]
pub struct ReleaseCredentials {
    token: String,
}

impl ReleaseCredentials {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for ReleaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Per-step wall-clock limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTimeouts {
    /// Checkout step limit.
    pub checkout_secs: u64,
    /// Runtime provisioning limit.
    pub provision_secs: u64,
    /// Dependency installation limit.
    pub install_secs: u64,
    /// Packaging limit.
    pub package_secs: u64,
    /// Artifact upload limit.
    pub upload_secs: u64,
    /// Release publication limit.
    pub release_secs: u64,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            checkout_secs: 300,
            provision_secs: 120,
            install_secs: 600,
            package_secs: 900,
            upload_secs: 300,
            release_secs: 300,
        }
    }
}

impl StepTimeouts {
    /// Checkout step limit.
    #[must_use]
    pub const fn checkout(&self) -> Duration {
        Duration::from_secs(self.checkout_secs)
    }

    /// Runtime provisioning limit.
    #[must_use]
    pub const fn provision(&self) -> Duration {
        Duration::from_secs(self.provision_secs)
    }

    /// Dependency installation limit.
    #[must_use]
    pub const fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    /// Packaging limit.
    #[must_use]
    pub const fn package(&self) -> Duration {
        Duration::from_secs(self.package_secs)
    }

    /// Artifact upload limit.
    #[must_use]
    pub const fn upload(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }

    /// Release publication limit.
    #[must_use]
    pub const fn release(&self) -> Duration {
        Duration::from_secs(self.release_secs)
    }
}

impl PipelineConfig {
    /// Loads configuration.
    ///
    /// With an explicit path, that file must exist and parse. Without one,
    /// `./slipway.toml` then `./slipway.json` are tried, and defaults are
    /// returned when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in ["slipway.toml", "slipway.json"] {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Loads configuration from a specific file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
                    path: display,
                    message: err.to_string(),
                })?
            }
            _ => toml::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: display,
                message: err.to_string(),
            })?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration, format chosen by extension (TOML default).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let display = path.display().to_string();
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::to_string_pretty(self).map_err(|err| ConfigError::Parse {
                    path: display.clone(),
                    message: err.to_string(),
                })?
            }
            _ => toml::to_string_pretty(self).map_err(|err| ConfigError::Parse {
                path: display.clone(),
                message: err.to_string(),
            })?,
        };

        std::fs::write(path, contents).map_err(|source| ConfigError::Read {
            path: display,
            source,
        })?;
        Ok(())
    }

    /// The matrix this pipeline builds: explicit entries when configured,
    /// otherwise the standard matrix for the project name.
    pub fn build_matrix(&self) -> Result<BuildMatrix, ConfigError> {
        match &self.matrix {
            Some(entries) => BuildMatrix::new(entries.clone()),
            None => Ok(BuildMatrix::standard(&self.project.name)),
        }
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::Invalid("project.name must not be empty".into()));
        }
        for (field, argv) in [
            ("commands.runtime_probe", &self.commands.runtime_probe),
            ("commands.install", &self.commands.install),
            ("commands.package", &self.commands.package),
        ] {
            if argv.is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        self.release.compiled_pattern()?;
        self.build_matrix()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Platform;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.project.name, "m");
        assert_eq!(config.project.runtime_version, "3.11");
        assert_eq!(config.source.remote, ".");
        assert_eq!(config.release.tag_pattern, DEFAULT_TAG_PATTERN);
        assert_eq!(config.release.base_url, "https://api.github.com");
        assert_eq!(config.commands.output_dir, PathBuf::from("dist"));
        assert_eq!(config.workspace_root, PathBuf::from(".slipway"));
        assert!(config.matrix.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_matrix_is_standard() {
        let matrix = PipelineConfig::default().build_matrix().unwrap();
        assert_eq!(
            matrix.expected_artifacts(),
            vec!["m-linux", "m-macos", "m-windows.exe"]
        );
    }

    #[test]
    fn test_load_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
[project]
name = "tool"
runtime_version = "3.12"

[release]
tag_pattern = "^release-"
repository = "acme/tool"
"#
        )
        .unwrap();

        let config = PipelineConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.project.name, "tool");
        assert_eq!(config.project.runtime_version, "3.12");
        assert_eq!(config.release.repository, Some("acme/tool".to_string()));
        // Untouched sections keep their defaults.
        assert_eq!(config.source.remote, ".");
    }

    #[test]
    fn test_load_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"project": {{"name": "tool"}}, "release": {{"token": "t-123"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.project.name, "tool");
        assert_eq!(
            config.release.credentials().map(|c| c.token().to_string()),
            Some("t-123".to_string())
        );
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let err = PipelineConfig::load(Some(Path::new("no-such-file.toml"))).unwrap_err();
        assert!(err.to_string().contains("no-such-file.toml"));
    }

    #[test]
    fn test_save_round_trips() {
        let mut config = PipelineConfig::default();
        config.project.name = "tool".to_string();
        config.matrix = Some(vec![MatrixEntry::for_platform(Platform::Linux, "tool")]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slipway.toml");
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = PipelineConfig::default();
        config.commands.install = Vec::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("commands.install"));
    }

    #[test]
    fn test_bad_tag_pattern_rejected() {
        let mut config = PipelineConfig::default();
        config.release.tag_pattern = "(broken".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = ReleaseCredentials::new("ghp_secret");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_timeouts_convert_to_durations() {
        let timeouts = StepTimeouts::default();
        assert_eq!(timeouts.package(), Duration::from_secs(900));
        assert_eq!(timeouts.checkout(), Duration::from_secs(300));
    }
}
