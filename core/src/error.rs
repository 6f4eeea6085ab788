//! Error types for the build scenario harness.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No template directory with the requested name exists.
    #[error("fixture template '{name}' not found under {templates_dir}")]
    FixtureNotFound { name: String, templates_dir: PathBuf },

    /// A file lookup matched zero or several candidates.
    #[error("expected exactly one file named '{name}' under {root}, found {matches}")]
    FileNotFound {
        name: String,
        root: PathBuf,
        matches: usize,
    },

    /// The build tool did not exit within its time budget.
    #[error("build of {tasks:?} timed out after {elapsed:?}")]
    Timeout { tasks: Vec<String>, elapsed: Duration },

    /// An outcome check failed.
    #[error("{0}")]
    Assertion(#[from] AssertionFailure),

    /// The build tool could not be started.
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// IO error during fixture operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration, matrix or scenario file error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A path lies outside the fixture it was resolved against.
    #[error("path {path} is not inside {root}")]
    InvalidPath { path: PathBuf, root: PathBuf },
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed outcome check, with the part of the build output it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    /// What the check expected.
    pub expected: String,
    /// Tail of the captured build output.
    pub output_excerpt: String,
}

impl AssertionFailure {
    pub fn new(expected: impl Into<String>, output_excerpt: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            output_excerpt: output_excerpt.into(),
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "assertion failed: {}", self.expected)?;
        writeln!(f, "--- build output (tail) ---")?;
        write!(f, "{}", self.output_excerpt)
    }
}

impl std::error::Error for AssertionFailure {}
