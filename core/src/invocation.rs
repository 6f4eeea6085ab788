//! Running the external build tool against a fixture.
//!
//! An invocation never fails because the build failed: a nonzero exit is
//! recorded in [`BuildInvocation::exit_succeeded`] and left to the
//! assertions. Errors are reserved for not being able to run the tool at all
//! and for exceeding the time budget.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::fixture::ProjectFixture;
use crate::options::{absolute, BuildOptions};
use crate::task::TaskPath;

/// Captured result of one build tool execution.
#[derive(Debug, Clone)]
pub struct BuildInvocation {
    /// Tasks (and raw arguments) passed on the command line.
    pub tasks: Vec<TaskPath>,
    /// Options the build ran with.
    pub options: BuildOptions,
    /// Whether the tool exited with status 0.
    pub exit_succeeded: bool,
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
    /// Project root the build ran in.
    pub project_dir: PathBuf,
    /// Wall-clock time of the build.
    pub duration: Duration,
}

impl BuildInvocation {
    /// Builds an invocation record from already-captured output.
    pub fn from_output(
        project_dir: impl Into<PathBuf>,
        tasks: Vec<TaskPath>,
        options: BuildOptions,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            options,
            exit_succeeded: exit_code == Some(0),
            exit_code,
            output: output.into(),
            project_dir: project_dir.into(),
            duration: Duration::ZERO,
        }
    }
}

/// An external build tool that can be run against a fixture.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Runs `tasks` in the fixture and captures the outcome.
    async fn execute(
        &self,
        fixture: &ProjectFixture,
        tasks: &[TaskPath],
        options: &BuildOptions,
    ) -> Result<BuildInvocation>;

    /// Returns the name of this tool.
    fn name(&self) -> &str;
}

/// Gradle, through the fixture's wrapper when it has one.
#[derive(Debug, Clone, Default)]
pub struct GradleTool {
    /// Executable used when the fixture has no `gradlew`.
    fallback: Option<PathBuf>,
    /// Interpreter the program is passed to, for wrappers without the executable bit.
    interpreter: Option<PathBuf>,
}

impl GradleTool {
    /// Creates a tool that prefers `gradlew` and falls back to `gradle` on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executable used when the fixture has no wrapper.
    pub fn with_fallback(mut self, executable: impl Into<PathBuf>) -> Self {
        self.fallback = Some(executable.into());
        self
    }

    /// Runs the resolved program through `interpreter` (e.g. `sh`).
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Resolves the program to run for a project rooted at `root`.
    ///
    /// A fallback given as a relative path (rather than a bare name looked up
    /// on `PATH`) is made absolute against the current directory.
    pub fn program_for(&self, root: &Path) -> Result<PathBuf> {
        let wrapper = root.join(if cfg!(windows) { "gradlew.bat" } else { "gradlew" });
        if wrapper.is_file() {
            return Ok(wrapper);
        }
        match &self.fallback {
            Some(fallback) if fallback.is_relative() && fallback.components().count() > 1 => {
                absolute(fallback)
            }
            Some(fallback) => Ok(fallback.clone()),
            None => Ok(PathBuf::from("gradle")),
        }
    }
}

#[async_trait]
impl BuildTool for GradleTool {
    async fn execute(
        &self,
        fixture: &ProjectFixture,
        tasks: &[TaskPath],
        options: &BuildOptions,
    ) -> Result<BuildInvocation> {
        let options = options.clone().with_absolute_paths()?;
        let mut program = self.program_for(fixture.root())?;
        let mut args = options.to_args();
        args.extend(tasks.iter().map(|task| task.as_str().to_string()));
        if let Some(interpreter) = &self.interpreter {
            args.insert(0, program.display().to_string());
            program = interpreter.clone();
        }

        tracing::info!(
            fixture = %fixture.name(),
            tool_version = %fixture.tool_version(),
            program = ?program,
            tasks = ?tasks,
            "starting build"
        );

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(fixture.root())
            .envs(options.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| Error::Spawn {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
            program: program.display().to_string(),
            reason: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::Spawn {
            program: program.display().to_string(),
            reason: "stderr was not captured".to_string(),
        })?;

        let run = async {
            let output = collect_output(stdout, stderr).await;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, output))
        };

        let outcome = tokio::time::timeout(options.timeout, run).await;
        let (status, output) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                tracing::warn!(
                    fixture = %fixture.name(),
                    timeout = ?options.timeout,
                    "build timed out"
                );
                return Err(Error::Timeout {
                    tasks: tasks.iter().map(|t| t.as_str().to_string()).collect(),
                    elapsed: start.elapsed(),
                });
            }
        };

        let duration = start.elapsed();
        tracing::info!(
            fixture = %fixture.name(),
            success = status.success(),
            exit_code = ?status.code(),
            duration = ?duration,
            "build finished"
        );

        Ok(BuildInvocation {
            tasks: tasks.to_vec(),
            options,
            exit_succeeded: status.success(),
            exit_code: status.code(),
            output,
            project_dir: fixture.root().to_path_buf(),
            duration,
        })
    }

    fn name(&self) -> &str {
        "gradle"
    }
}

/// Reads both streams to the end, interleaving lines in arrival order.
async fn collect_output(
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
) -> String {
    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut output = String::new();

    while stdout_open || stderr_open {
        tokio::select! {
            line = stdout_reader.next_line(), if stdout_open => {
                match line {
                    Ok(Some(line)) => {
                        crate::harness_debug!(line = %line, "build stdout");
                        output.push_str(&line);
                        output.push('\n');
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        tracing::error!(error = %e, "error reading stdout");
                        stdout_open = false;
                    }
                }
            }
            line = stderr_reader.next_line(), if stderr_open => {
                match line {
                    Ok(Some(line)) => {
                        crate::harness_debug!(line = %line, "build stderr");
                        output.push_str(&line);
                        output.push('\n');
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::error!(error = %e, "error reading stderr");
                        stderr_open = false;
                    }
                }
            }
        }
    }

    output
}
