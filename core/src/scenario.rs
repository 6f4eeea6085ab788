//! Declarative build scenarios.
//!
//! A scenario file names a fixture template and an ordered list of steps:
//! builds (each with its expectations) and file mutations in between. The
//! runner executes the steps strictly in order against one matrix row and
//! stops at the first failure. Each build's expectations are checked against
//! that build only.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::assertions::{OutputPattern, SourceMatch};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::fixture::ProjectFixture;
use crate::invocation::{BuildInvocation, BuildTool};
use crate::matrix::{known_issue, MatrixEntry, VersionMatrix};
use crate::options::BuildOptions;
use crate::task::TaskPath;

/// Which built-in matrix a scenario runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatrixKind {
    #[default]
    Android,
    AndroidWithJack,
}

impl MatrixKind {
    pub fn matrix(&self) -> VersionMatrix {
        match self {
            Self::Android => VersionMatrix::android(),
            Self::AndroidWithJack => VersionMatrix::android_with_jack(),
        }
    }
}

/// A scripted sequence of builds and mutations against one fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,

    /// What this scenario checks.
    #[serde(default)]
    pub description: String,

    /// Fixture template name.
    pub project: String,

    /// Matrix the scenario runs against.
    #[serde(default)]
    pub matrix: MatrixKind,

    /// Steps, executed in order.
    pub steps: Vec<Step>,
}

/// One scenario step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Run the build and check the outcome.
    Build(BuildStep),
    /// Replace text in a fixture file.
    Modify(ModifyStep),
    /// Overwrite a fixture file.
    Write(WriteStep),
}

impl Step {
    /// Action name as written in scenario files.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Modify(_) => "modify",
            Self::Write(_) => "write",
        }
    }
}

/// A build and its expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStep {
    /// Tasks and raw arguments passed to the build.
    pub tasks: Vec<TaskPath>,

    /// Overrides incremental compilation.
    #[serde(default)]
    pub incremental: Option<bool>,

    /// Forces every task to rerun.
    #[serde(default)]
    pub rerun_all: bool,

    /// Expectations checked against this build.
    #[serde(default)]
    pub expect: Expectations,
}

/// A text replacement in one file.
///
/// The target is named by exactly one of `file` and `file_suffix`; see
/// [`FileTarget`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_suffix: Option<String>,
    pub replace: String,
    pub with: String,
}

/// A whole-file rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_suffix: Option<String>,
    pub contents: String,
}

/// The file a `modify` or `write` step applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTarget<'a> {
    /// `file` containing `/`: a path relative to the project root.
    Path(&'a str),
    /// `file` without `/`: a name matching exactly one file.
    Name(&'a str),
    /// `file_suffix`: the one file whose name ends with it.
    Suffix(&'a str),
}

impl<'a> FileTarget<'a> {
    fn from_fields(file: &'a Option<String>, file_suffix: &'a Option<String>) -> Result<Self> {
        match (file.as_deref(), file_suffix.as_deref()) {
            (Some(file), None) if file.contains('/') => Ok(Self::Path(file)),
            (Some(file), None) => Ok(Self::Name(file)),
            (None, Some(suffix)) => Ok(Self::Suffix(suffix)),
            _ => Err(Error::Config(
                "a file step needs exactly one of `file` or `file_suffix`".to_string(),
            )),
        }
    }

    /// Resolves the target to a path inside `fixture`.
    pub fn resolve(&self, fixture: &ProjectFixture) -> Result<PathBuf> {
        match self {
            Self::Path(path) => {
                let relative = Path::new(path);
                let escapes = relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                if escapes {
                    return Err(Error::InvalidPath {
                        path: relative.to_path_buf(),
                        root: fixture.root().to_path_buf(),
                    });
                }
                Ok(fixture.root().join(relative))
            }
            Self::Name(name) => fixture.locate_file_by_name(name),
            Self::Suffix(suffix) => fixture.locate_file_by_suffix(suffix),
        }
    }

    fn label(&self) -> &'a str {
        match self {
            Self::Path(value) | Self::Name(value) | Self::Suffix(value) => *value,
        }
    }
}

impl ModifyStep {
    pub fn target(&self) -> Result<FileTarget<'_>> {
        FileTarget::from_fields(&self.file, &self.file_suffix)
    }
}

impl WriteStep {
    pub fn target(&self) -> Result<FileTarget<'_>> {
        FileTarget::from_fields(&self.file, &self.file_suffix)
    }
}

/// Checks run against one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectations {
    /// Required exit outcome; unchecked if absent.
    #[serde(default)]
    pub success: Option<bool>,

    /// Substrings that must appear.
    #[serde(default)]
    pub contains: Vec<String>,

    /// Substrings that must appear unless a known issue affects the row.
    #[serde(default)]
    pub guarded_contains: Vec<GuardedContains>,

    /// Substrings that must not appear.
    #[serde(default)]
    pub not_contains: Vec<String>,

    /// Regexes that must not match.
    #[serde(default)]
    pub not_matches: Vec<String>,

    /// Tasks that must have executed.
    #[serde(default)]
    pub tasks_executed: Vec<TaskPath>,

    /// Tasks that must be up to date.
    #[serde(default)]
    pub tasks_up_to_date: Vec<TaskPath>,

    /// Expected compiled Kotlin sources.
    #[serde(default)]
    pub compiled_kotlin: Option<SourceExpectation>,

    /// Expected compiled Java sources.
    #[serde(default)]
    pub compiled_java: Option<SourceExpectation>,

    /// Check the Kotlin build services lifecycle lines.
    #[serde(default)]
    pub build_services: bool,
}

/// A containment check skipped on rows affected by a known issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardedContains {
    pub text: String,
    pub known_issue: String,
}

/// Expected compiled source set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceExpectation {
    /// Project-relative paths.
    #[serde(default)]
    pub files: Vec<String>,

    /// File names resolved in the fixture before comparing.
    #[serde(default)]
    pub located: Vec<String>,

    /// Exact or weak comparison.
    #[serde(default, rename = "match")]
    pub mode: SourceMatch,
}

impl Scenario {
    /// Loads a scenario from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(Error::Io)?;
        Self::from_yaml(&content)
    }

    /// Parses and validates a scenario from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("failed to parse scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Rejects scenarios that could never run.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Config(format!("scenario '{}' has no steps", self.name)));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let target = match step {
                Step::Build(_) => Ok(None),
                Step::Modify(modify) => modify.target().map(Some),
                Step::Write(write) => write.target().map(Some),
            };
            if let Err(e) = target {
                return Err(Error::Config(format!(
                    "scenario '{}' step {}: {}",
                    self.name,
                    index + 1,
                    e
                )));
            }

            if let Step::Build(build) = step {
                if build.tasks.is_empty() {
                    return Err(Error::Config(format!(
                        "scenario '{}' step {} builds no tasks",
                        self.name,
                        index + 1
                    )));
                }
                for guarded in &build.expect.guarded_contains {
                    if known_issue(&guarded.known_issue).is_none() {
                        return Err(Error::Config(format!(
                            "scenario '{}' references unknown issue '{}'",
                            self.name, guarded.known_issue
                        )));
                    }
                }
                for pattern in &build.expect.not_matches {
                    OutputPattern::regex(pattern)?;
                }
            }
        }

        Ok(())
    }
}

/// Outcome of running one scenario on one matrix row.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Matrix row name.
    pub entry: String,
    /// Whether every step passed.
    pub passed: bool,
    /// Number of steps that completed.
    pub steps_completed: usize,
    /// Total wall-clock time.
    pub duration: Duration,
    /// First error, if any.
    pub error: Option<String>,
    /// Fixture directory, when it was kept.
    pub fixture_root: Option<PathBuf>,
}

/// Runs scenarios against a build tool.
pub struct ScenarioRunner {
    tool: Box<dyn BuildTool>,
    config: HarnessConfig,
}

impl ScenarioRunner {
    /// Creates a runner for `tool` with the given configuration.
    pub fn new(tool: Box<dyn BuildTool>, config: HarnessConfig) -> Self {
        Self { tool, config }
    }

    /// Runs `scenario` once per row of its matrix, in order.
    pub async fn run_matrix(&self, scenario: &Scenario, matrix: &VersionMatrix) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(matrix.entries.len());
        for entry in matrix.iter() {
            reports.push(self.run(scenario, entry).await);
        }
        reports
    }

    /// Runs `scenario` on one matrix row.
    pub async fn run(&self, scenario: &Scenario, entry: &MatrixEntry) -> ScenarioReport {
        let start = Instant::now();
        let mut steps_completed = 0;
        let mut fixture_root = None;

        tracing::info!(
            scenario = %scenario.name,
            entry = %entry.name,
            project = %scenario.project,
            "running scenario"
        );

        let result = self
            .run_steps(scenario, entry, &mut steps_completed, &mut fixture_root)
            .await;

        let (passed, error) = match result {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::warn!(
                    scenario = %scenario.name,
                    entry = %entry.name,
                    step = steps_completed + 1,
                    error = %e,
                    "scenario failed"
                );
                (false, Some(e.to_string()))
            }
        };

        ScenarioReport {
            scenario: scenario.name.clone(),
            entry: entry.name.clone(),
            passed,
            steps_completed,
            duration: start.elapsed(),
            error,
            fixture_root,
        }
    }

    async fn run_steps(
        &self,
        scenario: &Scenario,
        entry: &MatrixEntry,
        steps_completed: &mut usize,
        fixture_root: &mut Option<PathBuf>,
    ) -> Result<()> {
        let base_options = self.config.build_options_for(entry)?;
        let mut fixture = ProjectFixture::create(
            &self.config.templates_dir,
            &scenario.project,
            &entry.tool_version,
        )?
        .with_plugin_version(entry.plugin_version.clone());

        if self.config.keep_fixtures {
            fixture.keep();
            *fixture_root = Some(fixture.root().to_path_buf());
        }

        for (index, step) in scenario.steps.iter().enumerate() {
            tracing::info!(
                scenario = %scenario.name,
                step = index + 1,
                action = step.action(),
                "running step"
            );
            match step {
                Step::Build(build) => {
                    let options = derive_options(&base_options, build);
                    let invocation = self.tool.execute(&fixture, &build.tasks, &options).await?;
                    check_expectations(&invocation, &build.expect, &fixture, entry)?;
                }
                Step::Modify(modify) => apply_modify(&fixture, modify)?,
                Step::Write(write) => {
                    let path = write.target()?.resolve(&fixture)?;
                    fixture.write_file(&path, &write.contents)?;
                }
            }
            *steps_completed += 1;
        }

        Ok(())
    }
}

/// Replaces text in the step's target file. Missing text is an error and
/// leaves the file untouched.
fn apply_modify(fixture: &ProjectFixture, modify: &ModifyStep) -> Result<()> {
    let target = modify.target()?;
    let path = target.resolve(fixture)?;
    let current = std::fs::read_to_string(&path)?;
    if !current.contains(&modify.replace) {
        return Err(Error::Config(format!(
            "text to replace not found in {}: '{}'",
            target.label(),
            modify.replace
        )));
    }
    fixture.mutate_file(&path, |content| content.replace(&modify.replace, &modify.with))
}

/// Per-step copy of the row's base options.
fn derive_options(base: &BuildOptions, build: &BuildStep) -> BuildOptions {
    let mut options = base.clone().with_rerun_all(build.rerun_all);
    if let Some(incremental) = build.incremental {
        options = options.with_incremental(incremental);
    }
    options
}

/// Runs every expectation of a build step against its invocation.
pub fn check_expectations(
    invocation: &BuildInvocation,
    expect: &Expectations,
    fixture: &ProjectFixture,
    entry: &MatrixEntry,
) -> Result<()> {
    match expect.success {
        Some(true) => {
            invocation.assert_successful()?;
        }
        Some(false) => {
            invocation.assert_failed()?;
        }
        None => {}
    }

    invocation.assert_contains(&expect.contains)?;

    for guarded in &expect.guarded_contains {
        let issue = known_issue(&guarded.known_issue).ok_or_else(|| {
            Error::Config(format!("unknown issue '{}'", guarded.known_issue))
        })?;
        if !issue.affects(entry) {
            invocation.assert_contains(&[guarded.text.as_str()])?;
        }
    }

    for needle in &expect.not_contains {
        invocation.assert_not_contains(needle.as_str())?;
    }
    for pattern in &expect.not_matches {
        invocation.assert_not_contains(OutputPattern::regex(pattern)?)?;
    }

    invocation.assert_tasks_executed(&expect.tasks_executed)?;
    invocation.assert_tasks_up_to_date(&expect.tasks_up_to_date)?;

    if let Some(kotlin) = &expect.compiled_kotlin {
        let expected = expected_sources(fixture, kotlin)?;
        invocation.assert_compiled_kotlin_sources(&expected, kotlin.mode)?;
    }
    if let Some(java) = &expect.compiled_java {
        let expected = expected_sources(fixture, java)?;
        invocation.assert_compiled_java_sources(&expected, java.mode)?;
    }

    if expect.build_services {
        invocation.check_kotlin_gradle_build_services()?;
    }

    Ok(())
}

fn expected_sources(fixture: &ProjectFixture, expectation: &SourceExpectation) -> Result<Vec<String>> {
    let mut expected = expectation.files.clone();
    let located = expectation
        .located
        .iter()
        .map(|name| fixture.locate_file_by_name(name))
        .collect::<Result<Vec<_>>>()?;
    expected.extend(fixture.relativize(&located)?);
    Ok(expected)
}
