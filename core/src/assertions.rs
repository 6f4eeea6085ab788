//! Outcome assertions over a captured build.
//!
//! Every check returns `Result<&BuildInvocation>` so a block of checks reads
//! as a chain of `?`. Failures carry the tail of the build output.

use std::collections::BTreeSet;
use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AssertionFailure, Error, Result};
use crate::invocation::BuildInvocation;
use crate::task::TaskPath;

/// Maximum number of trailing output lines quoted in a failure.
const EXCERPT_MAX_LINES: usize = 40;
/// Maximum size of the quoted output.
const EXCERPT_MAX_BYTES: usize = 4096;

/// Logged by the Kotlin daemon for each compile round.
const KOTLIN_SOURCES_PATTERN: &str = r"\[KOTLIN\] compile iteration: ([^\r\n]*)";
/// Logged by Gradle at debug level for each javac call.
const JAVA_SOURCES_PATTERN: &str = r"\[DEBUG\] \[[^\]]*JavaCompiler\] Compiler arguments: ([^\r\n]*)";

const BUILD_SERVICES_INITIALIZED: &str = "Initialized KotlinGradleBuildServices";
const BUILD_SERVICES_DISPOSED: &str = "Disposed KotlinGradleBuildServices";

fn kotlin_sources_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(KOTLIN_SOURCES_PATTERN).expect("regex for kotlin sources"))
}

fn java_sources_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(JAVA_SOURCES_PATTERN).expect("regex for java sources"))
}

/// Something that must not appear in the build output.
#[derive(Debug, Clone)]
pub enum OutputPattern {
    /// Plain substring.
    Literal(String),
    /// Regular expression.
    Regex(Regex),
}

impl OutputPattern {
    /// Compiles a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| Error::Config(format!("invalid output pattern '{}': {}", pattern, e)))
    }

    /// Returns the first match in `text`, if any.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Self::Literal(needle) => text.find(needle.as_str()).map(|at| &text[at..at + needle.len()]),
            Self::Regex(re) => re.find(text).map(|m| m.as_str()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Literal(needle) => format!("'{}'", needle),
            Self::Regex(re) => format!("/{}/", re.as_str()),
        }
    }
}

impl From<&str> for OutputPattern {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

impl From<Regex> for OutputPattern {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}

/// How strictly a compiled-source set is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMatch {
    /// Actual set must equal the expected set.
    #[default]
    Exact,
    /// Expected set must be contained in the actual set.
    Weak,
}

impl BuildInvocation {
    /// Fails unless the build exited successfully.
    pub fn assert_successful(&self) -> Result<&Self> {
        if self.exit_succeeded {
            Ok(self)
        } else {
            Err(self.failure(format!(
                "expected success, build exited with {}",
                exit_code_string(self.exit_code)
            )))
        }
    }

    /// Fails unless the build failed.
    pub fn assert_failed(&self) -> Result<&Self> {
        if self.exit_succeeded {
            Err(self.failure("expected failure, build succeeded"))
        } else {
            Ok(self)
        }
    }

    /// Fails on the first entry that is not a substring of the output.
    pub fn assert_contains<S: AsRef<str>>(&self, expected: &[S]) -> Result<&Self> {
        for entry in expected {
            let entry = entry.as_ref();
            if !self.output.contains(entry) {
                return Err(self.failure(format!("output should contain '{}'", entry)));
            }
        }
        Ok(self)
    }

    /// Fails if `pattern` occurs anywhere in the output.
    pub fn assert_not_contains(&self, pattern: impl Into<OutputPattern>) -> Result<&Self> {
        let pattern = pattern.into();
        match pattern.find(&self.output) {
            Some(found) => Err(self.failure(format!(
                "output should not contain {}, found '{}'",
                pattern.describe(),
                found
            ))),
            None => Ok(self),
        }
    }

    /// Fails unless `needle` occurs exactly `count` times.
    pub fn assert_substring_count(&self, needle: &str, count: usize) -> Result<&Self> {
        let actual = self.output.matches(needle).count();
        if actual == count {
            Ok(self)
        } else {
            Err(self.failure(format!(
                "expected '{}' {} time(s), found {}",
                needle, count, actual
            )))
        }
    }

    /// Fails unless every task was executed in this build.
    pub fn assert_tasks_executed(&self, tasks: &[TaskPath]) -> Result<&Self> {
        let markers: Vec<String> = tasks.iter().map(TaskPath::executed_marker).collect();
        self.assert_contains(&markers)
    }

    /// Fails unless every task was reported up to date.
    pub fn assert_tasks_up_to_date(&self, tasks: &[TaskPath]) -> Result<&Self> {
        let markers: Vec<String> = tasks.iter().map(TaskPath::up_to_date_marker).collect();
        self.assert_contains(&markers)
    }

    /// Kotlin sources the compiler reported, relative to the project.
    pub fn compiled_kotlin_sources(&self) -> BTreeSet<String> {
        kotlin_sources_regex()
            .captures_iter(&self.output)
            .filter_map(|cap| cap.get(1))
            .flat_map(|list| list.as_str().split(", "))
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(|path| project_relative(&self.project_dir, Path::new(path)))
            .collect()
    }

    /// Java sources passed to javac, relative to the project.
    pub fn compiled_java_sources(&self) -> BTreeSet<String> {
        java_sources_regex()
            .captures_iter(&self.output)
            .filter_map(|cap| cap.get(1))
            .flat_map(|args| args.as_str().split(' '))
            .filter(|arg| arg.to_lowercase().ends_with(".java"))
            .map(|path| project_relative(&self.project_dir, Path::new(path)))
            .collect()
    }

    /// Compares the reported Kotlin sources with `expected`.
    pub fn assert_compiled_kotlin_sources<S: AsRef<str>>(
        &self,
        expected: &[S],
        mode: SourceMatch,
    ) -> Result<&Self> {
        self.assert_source_set("Kotlin", expected, self.compiled_kotlin_sources(), mode)
    }

    /// Compares the reported Java sources with `expected`.
    pub fn assert_compiled_java_sources<S: AsRef<str>>(
        &self,
        expected: &[S],
        mode: SourceMatch,
    ) -> Result<&Self> {
        self.assert_source_set("Java", expected, self.compiled_java_sources(), mode)
    }

    /// Checks the Kotlin build services were set up and torn down exactly once.
    pub fn check_kotlin_gradle_build_services(&self) -> Result<&Self> {
        self.assert_substring_count(BUILD_SERVICES_INITIALIZED, 1)?
            .assert_substring_count(BUILD_SERVICES_DISPOSED, 1)
    }

    fn assert_source_set<S: AsRef<str>>(
        &self,
        language: &str,
        expected: &[S],
        actual: BTreeSet<String>,
        mode: SourceMatch,
    ) -> Result<&Self> {
        let expected: BTreeSet<String> = expected
            .iter()
            .map(|path| normalize(Path::new(path.as_ref())))
            .collect();

        let missing: Vec<&String> = expected.difference(&actual).collect();
        let unexpected: Vec<&String> = match mode {
            SourceMatch::Exact => actual.difference(&expected).collect(),
            SourceMatch::Weak => Vec::new(),
        };

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(self);
        }

        let mut message = format!("compiled {} files differ ({:?} match)", language, mode);
        if !missing.is_empty() {
            message.push_str(&format!("\n  missing: {:?}", missing));
        }
        if !unexpected.is_empty() {
            message.push_str(&format!("\n  unexpected: {:?}", unexpected));
        }
        message.push_str(&format!("\n  actual: {:?}", actual));
        Err(self.failure(message))
    }

    fn failure(&self, expected: impl Into<String>) -> Error {
        Error::Assertion(AssertionFailure::new(expected, output_excerpt(&self.output)))
    }
}

/// Last lines of `output`, bounded in count and size.
pub fn output_excerpt(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(EXCERPT_MAX_LINES);
    let mut excerpt = lines[start..].join("\n");
    let mut truncated = start > 0;

    if excerpt.len() > EXCERPT_MAX_BYTES {
        let mut cut = excerpt.len() - EXCERPT_MAX_BYTES;
        while !excerpt.is_char_boundary(cut) {
            cut += 1;
        }
        excerpt = excerpt[cut..].to_string();
        truncated = true;
    }

    if truncated {
        format!("[... output truncated ...]\n{}", excerpt)
    } else {
        excerpt
    }
}

fn exit_code_string(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Path relative to `root` when it lies inside it, otherwise the normalized path.
fn project_relative(root: &Path, path: &Path) -> String {
    if path.is_relative() {
        return normalize(path);
    }
    if let Ok(relative) = path.strip_prefix(root) {
        return normalize(relative);
    }
    if let (Ok(root), Ok(path)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(relative) = path.strip_prefix(&root) {
            return normalize(relative);
        }
    }
    normalize(path)
}

/// Lexically normalized `/`-separated form of `path`.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::Prefix(prefix) => parts.push(prefix.as_os_str().to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().replace('\\', "/")),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}
