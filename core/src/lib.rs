//! Build Scenario Harness - integration-test harness for Gradle Android/Kotlin builds
//!
//! This library copies fixture projects into scratch directories, runs the
//! build tool against them across a version matrix, mutates sources between
//! builds, and checks the captured output for task states and compiled sources.

pub mod assertions;
pub mod config;
pub mod debug;
pub mod error;
pub mod fixture;
pub mod invocation;
pub mod matrix;
pub mod options;
pub mod scenario;
pub mod task;

pub use error::{AssertionFailure, Error, Result};

pub use assertions::{output_excerpt, OutputPattern, SourceMatch};
pub use config::{HarnessConfig, ValidationResult};
pub use fixture::ProjectFixture;
pub use invocation::{BuildInvocation, BuildTool, GradleTool};
pub use matrix::{known_issue, KnownIssue, MatrixEntry, VersionMatrix, AGP_SKIPS_KOTLIN_UNIT_TESTS};
pub use options::{BuildOptions, LogLevel};
pub use scenario::{
    check_expectations, BuildStep, Expectations, MatrixKind, Scenario, ScenarioReport,
    ScenarioRunner, Step,
};
pub use task::{kotlin_compile_tasks, TaskPath};
