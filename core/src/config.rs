//! Harness configuration.
//!
//! Settings come from an optional `harness.toml` and are then overridden by
//! environment variables:
//! - `HARNESS_TEMPLATES_DIR` - directory holding fixture templates
//! - `HARNESS_ANDROID_HOME` - Android SDK location
//! - `HARNESS_GRADLE` - Gradle executable for fixtures without a wrapper
//! - `HARNESS_TIMEOUT_SECS` - per-build time budget
//! - `HARNESS_KOTLIN_VERSION` - Kotlin Gradle plugin version passed to templates
//! - `HARNESS_KEEP_FIXTURES=1` - keep fixture directories after each scenario

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debug::env_flag;
use crate::error::{Error, Result};
use crate::matrix::MatrixEntry;
use crate::options::{BuildOptions, LogLevel};

/// Harness-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Directory containing one subdirectory per fixture template.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Android SDK passed to every build.
    #[serde(default = "default_android_home")]
    pub android_home: PathBuf,

    /// Gradle executable for fixtures without `gradlew`.
    #[serde(default)]
    pub gradle_executable: Option<PathBuf>,

    /// Per-build timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep fixture directories after scenarios finish.
    #[serde(default)]
    pub keep_fixtures: bool,

    /// Kotlin Gradle plugin version passed as `-Pkotlin_version`.
    #[serde(default)]
    pub kotlin_version: Option<String>,

    /// Gradle console log level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Reuse a Gradle daemon across builds.
    #[serde(default)]
    pub daemon: bool,

    /// Flags appended to every build.
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("testProject")
}

fn default_android_home() -> PathBuf {
    PathBuf::from("../../../dependencies/androidSDK")
}

fn default_timeout_secs() -> u64 {
    900 // 15 minutes
}

fn default_extra_args() -> Vec<String> {
    BuildOptions::default().extra_args
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            android_home: default_android_home(),
            gradle_executable: None,
            timeout_secs: default_timeout_secs(),
            keep_fixtures: false,
            kotlin_version: None,
            log_level: LogLevel::default(),
            daemon: false,
            extra_args: default_extra_args(),
        }
    }
}

impl HarnessConfig {
    /// Parses configuration from TOML.
    pub fn from_toml(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Config(format!("failed to parse harness config: {}", e)))
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;
        Self::from_toml(&content)
    }

    /// Loads `path` if it exists (defaults otherwise) and applies environment overrides.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.is_file() {
            tracing::info!(path = ?path, "loading harness config");
            Self::load(path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Applies `HARNESS_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("HARNESS_TEMPLATES_DIR") {
            self.templates_dir = PathBuf::from(dir);
        }
        if let Ok(home) = std::env::var("HARNESS_ANDROID_HOME") {
            self.android_home = PathBuf::from(home);
        }
        if let Ok(gradle) = std::env::var("HARNESS_GRADLE") {
            self.gradle_executable = Some(PathBuf::from(gradle));
        }
        if let Ok(secs) = std::env::var("HARNESS_TIMEOUT_SECS") {
            self.timeout_secs = secs
                .parse()
                .map_err(|_| Error::Config(format!("HARNESS_TIMEOUT_SECS is not a number: {}", secs)))?;
        }
        if let Ok(version) = std::env::var("HARNESS_KOTLIN_VERSION") {
            self.kotlin_version = Some(version);
        }
        if env_flag("HARNESS_KEEP_FIXTURES") {
            self.keep_fixtures = true;
        }
        Ok(self)
    }

    /// Base options every build starts from.
    ///
    /// Relative homes are resolved against the current directory here, since
    /// builds run with the fixture root as their working directory.
    pub fn default_build_options(&self) -> Result<BuildOptions> {
        let mut options = BuildOptions::default()
            .with_tool_home(self.android_home.clone())
            .with_daemon(self.daemon)
            .with_log_level(self.log_level)
            .with_extra_args(self.extra_args.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(version) = &self.kotlin_version {
            options = options.with_kotlin_version(version.clone());
        }
        options.with_absolute_paths()
    }

    /// Base options for one matrix row.
    ///
    /// A row naming a JDK variable requires that variable to be set.
    pub fn build_options_for(&self, entry: &MatrixEntry) -> Result<BuildOptions> {
        let mut options = self
            .default_build_options()?
            .with_plugin_version(entry.plugin_version.clone());

        if let Some(var) = &entry.java_home_env {
            let home = std::env::var(var).map_err(|_| {
                Error::Config(format!("matrix entry '{}' needs {} to point at a JDK", entry.name, var))
            })?;
            options = options.with_java_home(home).with_absolute_paths()?;
        }

        Ok(options)
    }

    /// Checks the configuration for obvious mistakes.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.timeout_secs == 0 {
            result.add_error("timeout_secs must be greater than zero");
        }
        if !self.templates_dir.is_dir() {
            result.add_error(format!(
                "templates_dir {} is not a directory",
                self.templates_dir.display()
            ));
        }
        if !self.android_home.is_dir() {
            result.add_warning(format!(
                "android_home {} does not exist; Android builds will fail",
                self.android_home.display()
            ));
        }
        if self.timeout_secs > 7200 {
            result.add_warning("timeout_secs over 2 hours may indicate a misconfiguration");
        }

        result
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal problems.
    pub errors: Vec<String>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}
