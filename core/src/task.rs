//! Gradle task identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A Gradle task path such as `:app:compileDebugKotlin`.
///
/// Matching against build output treats the path as an opaque string; the
/// helpers below only produce the two log markers the assertions look for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPath(String);

impl TaskPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Task `action` in project `module`.
    pub fn in_module(module: &str, action: &str) -> Self {
        Self(format!(":{}:{}", module, action))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Module segment, or `None` for a root project task.
    pub fn module(&self) -> Option<&str> {
        let trimmed = self.0.strip_prefix(':').unwrap_or(&self.0);
        trimmed.rsplit_once(':').map(|(module, _)| module)
    }

    /// Last path segment.
    pub fn action(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }

    /// Line Gradle logs (at `--info`) when it runs the task.
    pub fn executed_marker(&self) -> String {
        format!("Executing task '{}'", self.0)
    }

    /// Line Gradle logs when it skips the task as current.
    pub fn up_to_date_marker(&self) -> String {
        format!("{} UP-TO-DATE", self.0)
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TaskPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Expands `:<module>:compile<Flavor><BuildType>Kotlin` for every combination,
/// in module, flavor, build type order.
pub fn kotlin_compile_tasks(modules: &[&str], flavors: &[&str], build_types: &[&str]) -> Vec<TaskPath> {
    let mut tasks = Vec::with_capacity(modules.len() * flavors.len() * build_types.len());
    for module in modules {
        for flavor in flavors {
            for build_type in build_types {
                tasks.push(TaskPath::in_module(
                    module,
                    &format!("compile{}{}Kotlin", flavor, build_type),
                ));
            }
        }
    }
    tasks
}
