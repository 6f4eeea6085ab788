//! Project fixtures: scratch copies of template projects.
//!
//! A fixture is created from a named template directory, copied into a
//! private temporary directory so the template itself is never touched, and
//! deleted when dropped (unless [`ProjectFixture::keep`] was called).

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Location of the wrapper properties inside a Gradle project.
const WRAPPER_PROPERTIES: &str = "gradle/wrapper/gradle-wrapper.properties";

/// An on-disk project used as the input of a build scenario.
pub struct ProjectFixture {
    /// Template name.
    name: String,
    /// Gradle version the fixture is prepared for.
    tool_version: String,
    /// Android Gradle plugin version, if pinned.
    plugin_version: Option<String>,
    /// Project root inside the scratch directory.
    root: PathBuf,
    /// Scratch directory owner; `None` once kept.
    scratch: Option<TempDir>,
}

impl ProjectFixture {
    /// Copies template `name` from `templates_dir` into a fresh scratch directory.
    ///
    /// Fails with [`Error::FixtureNotFound`] if no such template directory exists.
    pub fn create(templates_dir: &Path, name: &str, tool_version: &str) -> Result<Self> {
        let template = templates_dir.join(name);
        if !template.is_dir() {
            return Err(Error::FixtureNotFound {
                name: name.to_string(),
                templates_dir: templates_dir.to_path_buf(),
            });
        }

        let prefix: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .to_lowercase();
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir()?;
        let root = scratch.path().join(name);

        copy_tree(&template, &root)?;

        tracing::info!(
            fixture = %name,
            tool_version = %tool_version,
            root = ?root,
            "created project fixture"
        );

        let fixture = Self {
            name: name.to_string(),
            tool_version: tool_version.to_string(),
            plugin_version: None,
            root,
            scratch: Some(scratch),
        };
        fixture.prepare_wrapper()?;
        Ok(fixture)
    }

    /// Pins the Android Gradle plugin version recorded on the fixture.
    pub fn with_plugin_version(mut self, version: impl Into<String>) -> Self {
        self.plugin_version = Some(version.into());
        self
    }

    /// Returns the template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the Gradle version.
    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    /// Returns the pinned plugin version.
    pub fn plugin_version(&self) -> Option<&str> {
        self.plugin_version.as_deref()
    }

    /// Returns the project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keeps the scratch directory on disk after the fixture is dropped.
    pub fn keep(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            #[allow(deprecated)]
            let path = scratch.into_path();
            tracing::info!(fixture = %self.name, path = ?path, "keeping project fixture");
        }
    }

    /// Finds the single file called `file_name` anywhere under the root.
    ///
    /// Zero or multiple matches fail with [`Error::FileNotFound`].
    pub fn locate_file_by_name(&self, file_name: &str) -> Result<PathBuf> {
        self.locate_unique(file_name, |name| name == file_name)
    }

    /// Finds the single file whose name ends with `suffix`.
    pub fn locate_file_by_suffix(&self, suffix: &str) -> Result<PathBuf> {
        self.locate_unique(suffix, |name| name.ends_with(suffix))
    }

    fn locate_unique(&self, label: &str, matches: impl Fn(&str) -> bool) -> Result<PathBuf> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_str().is_some_and(&matches) {
                found.push(entry.into_path());
            }
        }

        if found.len() != 1 {
            tracing::debug!(name = %label, candidates = ?found, "file lookup was not unique");
            return Err(Error::FileNotFound {
                name: label.to_string(),
                root: self.root.clone(),
                matches: found.len(),
            });
        }

        Ok(found.remove(0))
    }

    /// Rewrites a file through `transform`.
    ///
    /// Relative paths resolve against the project root. The new content is
    /// written to a sibling temp file, synced and renamed over the original,
    /// so the file on disk is always either fully old or fully new.
    pub fn mutate_file<F>(&self, path: impl AsRef<Path>, transform: F) -> Result<()>
    where
        F: FnOnce(String) -> String,
    {
        let path = self.resolve(path.as_ref());
        let original = fs::read_to_string(&path)?;
        let updated = transform(original);
        write_atomically(&path, &updated)?;
        tracing::info!(fixture = %self.name, file = ?path, "mutated fixture file");
        Ok(())
    }

    /// Replaces a file's content with the same atomic discipline as [`Self::mutate_file`].
    pub fn write_file(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = self.resolve(path.as_ref());
        write_atomically(&path, contents)?;
        tracing::info!(fixture = %self.name, file = ?path, "rewrote fixture file");
        Ok(())
    }

    /// Converts paths under the root into `/`-separated project-relative strings.
    pub fn relativize<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<String>> {
        paths
            .iter()
            .map(|path| relative_to(&self.root, path.as_ref()))
            .collect()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Points the Gradle wrapper, if the template has one, at `tool_version`.
    fn prepare_wrapper(&self) -> Result<()> {
        let properties = self.root.join(WRAPPER_PROPERTIES);
        if !properties.is_file() {
            return Ok(());
        }

        let url = format!(
            "distributionUrl=https\\://services.gradle.org/distributions/gradle-{}-bin.zip",
            self.tool_version
        );
        self.mutate_file(&properties, |content| {
            let mut replaced = false;
            let mut lines: Vec<String> = content
                .lines()
                .map(|line| {
                    if line.trim_start().starts_with("distributionUrl=") {
                        replaced = true;
                        url.clone()
                    } else {
                        line.to_string()
                    }
                })
                .collect();
            if !replaced {
                lines.push(url.clone());
            }
            lines.join("\n") + "\n"
        })
    }
}

/// Project-relative, `/`-separated form of `path`.
pub(crate) fn relative_to(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| Error::InvalidPath {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

/// Recursively copies `src` into `dst`.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidPath {
                path: entry.path().to_path_buf(),
                root: src.to_path_buf(),
            })?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Writes `contents` to a temp file next to `path`, syncs it and renames it into place.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| Error::InvalidPath {
        path: path.to_path_buf(),
        root: PathBuf::from("/"),
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;

        if let Ok(metadata) = fs::metadata(path) {
            fs::set_permissions(&temp_path, metadata.permissions())?;
        }

        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        fs::File::open(parent)?.sync_all()?;

        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
