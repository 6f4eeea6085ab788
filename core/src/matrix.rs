//! Toolchain version matrix and known upstream issues.
//!
//! A scenario is written once and run for every row of the matrix instead of
//! being duplicated per Gradle / Android plugin combination.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One Gradle / Android Gradle plugin combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Row label used in logs and reports.
    pub name: String,

    /// Gradle version.
    pub tool_version: String,

    /// Android Gradle plugin version.
    pub plugin_version: String,

    /// Environment variable naming the JDK to build with, if not the default.
    #[serde(default)]
    pub java_home_env: Option<String>,
}

impl MatrixEntry {
    pub fn new(name: impl Into<String>, tool_version: impl Into<String>, plugin_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_version: tool_version.into(),
            plugin_version: plugin_version.into(),
            java_home_env: None,
        }
    }

    /// Sets the environment variable naming this row's JDK.
    pub fn with_java_home_env(mut self, var: impl Into<String>) -> Self {
        self.java_home_env = Some(var.into());
        self
    }
}

/// Rows a scenario is run against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionMatrix {
    pub entries: Vec<MatrixEntry>,
}

impl VersionMatrix {
    /// Standard Android toolchain rows.
    pub fn android() -> Self {
        Self {
            entries: vec![
                MatrixEntry::new("gradle-3.3-agp-2.3", "3.3", "2.3.0"),
                MatrixEntry::new("gradle-4.0-agp-3.0", "4.0-milestone-1", "3.0.0-alpha2"),
            ],
        }
    }

    /// Rows using the deprecated Jack toolchain, which needs JDK 8.
    pub fn android_with_jack() -> Self {
        Self {
            entries: vec![MatrixEntry::new("gradle-3.3-agp-2.3-jack", "3.3", "2.3.+")
                .with_java_home_env("JDK_18")],
        }
    }

    /// Loads a matrix from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;
        Self::from_yaml(&content)
    }

    /// Parses a matrix from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let matrix: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("failed to parse version matrix: {}", e)))?;
        if matrix.entries.is_empty() {
            return Err(Error::Config("version matrix has no entries".to_string()));
        }
        Ok(matrix)
    }

    /// Returns the row called `name`.
    pub fn get(&self, name: &str) -> Option<&MatrixEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatrixEntry> {
        self.entries.iter()
    }
}

/// An upstream bug a scenario tolerates on some matrix rows.
///
/// Checks that a bug breaks are skipped by asking [`KnownIssue::affects`] at
/// the call site, so every skip names the issue it works around.
#[derive(Debug, Clone, Copy)]
pub struct KnownIssue {
    /// Short identifier.
    pub id: &'static str,
    /// What goes wrong.
    pub summary: &'static str,
    /// Upstream tracker link.
    pub tracker: &'static str,
    /// Android Gradle plugin versions that exhibit the issue.
    pub plugin_versions: &'static [&'static str],
}

impl KnownIssue {
    /// Returns whether `entry` runs a toolchain with this issue.
    pub fn affects(&self, entry: &MatrixEntry) -> bool {
        let affected = self.plugin_versions.contains(&entry.plugin_version.as_str());
        if affected {
            tracing::info!(
                issue = %self.id,
                entry = %entry.name,
                tracker = %self.tracker,
                "skipping check for known issue"
            );
        }
        affected
    }
}

/// Android Gradle plugin 3.0 alphas do not run Kotlin unit tests.
pub const AGP_SKIPS_KOTLIN_UNIT_TESTS: KnownIssue = KnownIssue {
    id: "agp-skips-kotlin-unit-tests",
    summary: "new Android Gradle plugin does not run Kotlin unit tests",
    tracker: "https://issuetracker.google.com/issues/38454212",
    plugin_versions: &["3.0.0-alpha2"],
};

/// Known issues a scenario file may reference by id.
pub const KNOWN_ISSUES: &[KnownIssue] = &[AGP_SKIPS_KOTLIN_UNIT_TESTS];

/// Looks up a known issue by id.
pub fn known_issue(id: &str) -> Option<&'static KnownIssue> {
    KNOWN_ISSUES.iter().find(|issue| issue.id == id)
}
