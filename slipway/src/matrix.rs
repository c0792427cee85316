//! The build matrix: which platforms are built and what each must produce.
//!
//! Artifact naming is a pure function of the project base name and the
//! platform, so re-running the same ref always yields byte-identical
//! artifact names.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::errors::ConfigError;

/// A target platform for one matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux x86-64.
    Linux,
    /// macOS.
    MacOs,
    /// Windows. The only platform whose executables carry a suffix.
    Windows,
}

impl Platform {
    /// All platforms of the standard matrix, in build order.
    pub const ALL: [Self; 3] = [Self::Linux, Self::MacOs, Self::Windows];

    /// Short lowercase label, used as the matrix entry id.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }

    /// Executable file suffix for the platform.
    #[must_use]
    pub const fn executable_suffix(self) -> &'static str {
        match self {
            Self::Linux | Self::MacOs => "",
            Self::Windows => ".exe",
        }
    }

    /// The expected executable name for a project base name.
    #[must_use]
    pub fn executable_name(self, base: &str) -> String {
        format!("{base}-{}{}", self.label(), self.executable_suffix())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One entry of the build matrix: a platform and its expected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// The platform this entry builds for.
    pub platform: Platform,
    /// The executable file name this entry must produce.
    pub artifact_name: String,
}

impl MatrixEntry {
    /// Creates an entry with an explicit artifact name.
    #[must_use]
    pub fn new(platform: Platform, artifact_name: impl Into<String>) -> Self {
        Self {
            platform,
            artifact_name: artifact_name.into(),
        }
    }

    /// Creates an entry with the conventional artifact name for `base`.
    #[must_use]
    pub fn for_platform(platform: Platform, base: &str) -> Self {
        Self::new(platform, platform.executable_name(base))
    }

    /// Stable identifier of this entry within a run.
    #[must_use]
    pub const fn entry_id(&self) -> &'static str {
        self.platform.label()
    }
}

/// The validated, ordered build matrix of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMatrix {
    entries: Vec<MatrixEntry>,
}

impl BuildMatrix {
    /// The standard three-entry matrix for a project base name.
    #[must_use]
    pub fn standard(base: &str) -> Self {
        Self {
            entries: Platform::ALL
                .iter()
                .map(|platform| MatrixEntry::for_platform(*platform, base))
                .collect(),
        }
    }

    /// Builds a matrix from explicit entries.
    ///
    /// Entry ids and artifact names must be unique: artifacts of one run
    /// share a namespace, so two entries writing the same name would
    /// clobber each other.
    pub fn new(entries: Vec<MatrixEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::Invalid(
                "build matrix must have at least one entry".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for entry in &entries {
            if !ids.insert(entry.entry_id()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate matrix entry '{}'",
                    entry.entry_id()
                )));
            }
            if !names.insert(entry.artifact_name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate artifact name '{}'",
                    entry.artifact_name
                )));
            }
        }

        Ok(Self { entries })
    }

    /// The entries in build order.
    #[must_use]
    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the matrix has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The artifact names the release stage must find, in matrix order.
    #[must_use]
    pub fn expected_artifacts(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.artifact_name.clone())
            .collect()
    }
}
