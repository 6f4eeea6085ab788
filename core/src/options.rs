//! Build options passed to each invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Gradle console log level.
///
/// The compiled-source assertions read lines Gradle only prints at `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    Warn,
    Lifecycle,
    Info,
    #[default]
    Debug,
}

impl LogLevel {
    /// Command-line flag selecting this level; `Lifecycle` is Gradle's default.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Self::Quiet => Some("--quiet"),
            Self::Warn => Some("--warn"),
            Self::Lifecycle => None,
            Self::Info => Some("--info"),
            Self::Debug => Some("--debug"),
        }
    }
}

/// Options for one build invocation.
///
/// Values are never mutated in place by the harness: a scenario starts from a
/// base (usually [`crate::config::HarnessConfig::default_build_options`]) and
/// derives per-invocation copies with the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Android SDK location, exported as `ANDROID_HOME`.
    pub tool_home: Option<PathBuf>,

    /// Android Gradle plugin version.
    pub plugin_version: Option<String>,

    /// Kotlin Gradle plugin version, read by templates as `$kotlin_version`.
    #[serde(default)]
    pub kotlin_version: Option<String>,

    /// JDK used by the build, exported as `JAVA_HOME`.
    pub java_home: Option<PathBuf>,

    /// Kotlin incremental compilation; the project's own setting when `None`.
    #[serde(default)]
    pub incremental: Option<bool>,

    /// Force every task to run (`--rerun-tasks`).
    #[serde(default)]
    pub rerun_all: bool,

    /// Reuse a Gradle daemon; `--no-daemon` when false.
    #[serde(default)]
    pub daemon: bool,

    /// Console log level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Raw flags appended after the derived ones.
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,

    /// Upper bound on the build tool's wall-clock time.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

fn default_extra_args() -> Vec<String> {
    vec!["--stacktrace".to_string()]
}

fn default_timeout() -> Duration {
    Duration::from_secs(900)
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            tool_home: None,
            plugin_version: None,
            kotlin_version: None,
            java_home: None,
            incremental: None,
            rerun_all: false,
            daemon: false,
            log_level: LogLevel::default(),
            extra_args: default_extra_args(),
            timeout: default_timeout(),
        }
    }
}

impl BuildOptions {
    /// Sets the Android SDK home.
    pub fn with_tool_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_home = Some(path.into());
        self
    }

    /// Sets the Android Gradle plugin version.
    pub fn with_plugin_version(mut self, version: impl Into<String>) -> Self {
        self.plugin_version = Some(version.into());
        self
    }

    /// Sets the Kotlin Gradle plugin version.
    pub fn with_kotlin_version(mut self, version: impl Into<String>) -> Self {
        self.kotlin_version = Some(version.into());
        self
    }

    /// Sets the JDK home.
    pub fn with_java_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.java_home = Some(path.into());
        self
    }

    /// Sets incremental compilation.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = Some(incremental);
        self
    }

    /// Sets force-rerun of all tasks.
    pub fn with_rerun_all(mut self, rerun_all: bool) -> Self {
        self.rerun_all = rerun_all;
        self
    }

    /// Sets daemon reuse.
    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Sets the console log level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Replaces the extra flags.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Makes `tool_home` and `java_home` absolute against the current directory.
    ///
    /// Builds run inside the fixture, so a relative home would otherwise be
    /// resolved against the scratch directory.
    pub fn with_absolute_paths(mut self) -> Result<Self> {
        self.tool_home = self.tool_home.as_deref().map(absolute).transpose()?;
        self.java_home = self.java_home.as_deref().map(absolute).transpose()?;
        Ok(self)
    }

    /// Command-line flags derived from these options, placed before the task list.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(version) = &self.kotlin_version {
            args.push(format!("-Pkotlin_version={}", version));
        }
        if let Some(version) = &self.plugin_version {
            args.push(format!("-Pandroid_tools_version={}", version));
        }
        if let Some(incremental) = self.incremental {
            args.push(format!("-Pkotlin.incremental={}", incremental));
        }
        if self.rerun_all {
            args.push("--rerun-tasks".to_string());
        }
        if !self.daemon {
            args.push("--no-daemon".to_string());
        }
        if let Some(flag) = self.log_level.flag() {
            args.push(flag.to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Environment variables derived from these options.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(home) = &self.tool_home {
            env.push(("ANDROID_HOME".to_string(), home.display().to_string()));
        }
        if let Some(home) = &self.java_home {
            env.push(("JAVA_HOME".to_string(), home.display().to_string()));
        }
        env
    }
}

/// `path` made absolute against the current directory, without touching the filesystem.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_copy_leaves_base_untouched() {
        let base = BuildOptions::default().with_plugin_version("2.3.0");
        let derived = base.clone().with_incremental(true).with_rerun_all(true);

        assert_eq!(base.incremental, None);
        assert!(!base.rerun_all);
        assert_eq!(derived.incremental, Some(true));
        assert!(derived.rerun_all);
        assert_eq!(derived.plugin_version.as_deref(), Some("2.3.0"));
    }

    #[test]
    fn args_include_derived_flags_in_order() {
        let options = BuildOptions::default()
            .with_kotlin_version("1.1.3")
            .with_plugin_version("3.0.0-alpha2")
            .with_incremental(true)
            .with_rerun_all(true);

        assert_eq!(
            options.to_args(),
            vec![
                "-Pkotlin_version=1.1.3",
                "-Pandroid_tools_version=3.0.0-alpha2",
                "-Pkotlin.incremental=true",
                "--rerun-tasks",
                "--no-daemon",
                "--debug",
                "--stacktrace",
            ]
        );
    }

    #[test]
    fn defaults_log_at_debug_without_daemon() {
        let args = BuildOptions::default().to_args();
        assert_eq!(args, vec!["--no-daemon", "--debug", "--stacktrace"]);
    }

    #[test]
    fn incremental_flag_only_when_chosen() {
        let args = BuildOptions::default().to_args();
        assert!(!args.iter().any(|a| a.starts_with("-Pkotlin.incremental")));

        let args = BuildOptions::default().with_incremental(false).to_args();
        assert!(args.iter().any(|a| a == "-Pkotlin.incremental=false"));
    }

    #[test]
    fn daemon_and_log_level_are_configurable() {
        let args = BuildOptions::default()
            .with_daemon(true)
            .with_log_level(LogLevel::Lifecycle)
            .to_args();
        assert_eq!(args, vec!["--stacktrace"]);

        let args = BuildOptions::default().with_log_level(LogLevel::Info).to_args();
        assert!(args.iter().any(|a| a == "--info"));
    }

    #[test]
    fn env_exports_homes() {
        let options = BuildOptions::default()
            .with_tool_home("/sdk")
            .with_java_home("/jdk8");
        let env = options.to_env();
        assert!(env.contains(&("ANDROID_HOME".to_string(), "/sdk".to_string())));
        assert!(env.contains(&("JAVA_HOME".to_string(), "/jdk8".to_string())));
    }

    #[test]
    fn relative_homes_resolve_against_current_dir() {
        let cwd = std::env::current_dir().unwrap();
        let options = BuildOptions::default()
            .with_tool_home("sdk")
            .with_java_home("jdks/jdk8")
            .with_absolute_paths()
            .unwrap();

        assert_eq!(options.tool_home, Some(cwd.join("sdk")));
        assert_eq!(options.java_home, Some(cwd.join("jdks/jdk8")));

        let env = options.to_env();
        assert!(env.contains(&(
            "ANDROID_HOME".to_string(),
            cwd.join("sdk").display().to_string()
        )));
    }

    #[test]
    fn absolute_homes_unchanged() {
        let options = BuildOptions::default()
            .with_tool_home("/opt/sdk")
            .with_absolute_paths()
            .unwrap();
        assert_eq!(options.tool_home, Some(PathBuf::from("/opt/sdk")));
        assert!(options.java_home.is_none());
    }
}
