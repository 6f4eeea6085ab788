//! Hermetic harness tests.
//!
//! These run against a scripted `gradlew` that imitates Gradle's up-to-date
//! checks: a task runs when a source under its directory changed since the
//! previous build (or with `--rerun-tasks`) and is reported UP-TO-DATE
//! otherwise. No Android SDK or network is needed.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use scenario_harness::{
    BuildOptions, BuildTool, Error, GradleTool, HarnessConfig, MatrixEntry, OutputPattern,
    ProjectFixture, Scenario, ScenarioRunner, SourceMatch, TaskPath,
};

const FAKE_GRADLEW: &str = r#"#!/bin/sh
rerun=false
for arg in "$@"; do
  case "$arg" in
    --rerun-tasks) rerun=true ;;
  esac
done
echo "args: $*"
if [ -n "$ANDROID_HOME" ] && [ -d "$ANDROID_HOME" ]; then
  echo "sdk: present"
else
  echo "sdk: missing $ANDROID_HOME"
fi
if [ -f jack.enabled ]; then
  echo "Kotlin Gradle plugin does not support the deprecated Jack toolchain"
  echo "BUILD FAILED"
  exit 1
fi
mkdir -p build
echo "Initialized KotlinGradleBuildServices"
if [ -f warn.enabled ]; then
  echo "Changed dependencies of configuration ':app:kapt' after it has been included in dependency resolution"
fi
changed=""
for f in $(find src -name '*.kt' | sort); do
  sum=$(cksum < "$f")
  stamp="build/$(echo "$f" | tr '/' '_').sum"
  if [ "$rerun" = true ] || [ ! -f "$stamp" ] || [ "$(cat "$stamp")" != "$sum" ]; then
    changed="$changed${changed:+, }$f"
    echo "$sum" > "$stamp"
  fi
done
while read -r task dir; do
  [ -z "$task" ] && continue
  case "$changed" in
    *"$dir/"*) echo "Executing task '$task'" ;;
    *) echo "$task UP-TO-DATE" ;;
  esac
done < tasks.txt
if [ -n "$changed" ]; then
  echo "[KOTLIN] compile iteration: $changed"
fi
echo "Disposed KotlinGradleBuildServices"
echo "BUILD SUCCESSFUL"
"#;

/// Writes a two-module fake project template called `name` under `templates`.
fn write_template(templates: &Path, name: &str) {
    let root = templates.join(name);
    fs::create_dir_all(root.join("src/app/foo")).unwrap();
    fs::create_dir_all(root.join("src/lib/bar")).unwrap();
    fs::write(root.join("gradlew"), FAKE_GRADLEW).unwrap();
    fs::write(
        root.join("tasks.txt"),
        ":app:compileDebugKotlin src/app\n:lib:compileDebugKotlin src/lib\n",
    )
    .unwrap();
    fs::write(
        root.join("src/app/foo/getSomething.kt"),
        "package foo\n\nfun getSomething() = 5\n",
    )
    .unwrap();
    fs::write(
        root.join("src/app/foo/KotlinActivity1.kt"),
        "package foo\n\nclass KotlinActivity1\n",
    )
    .unwrap();
    fs::write(root.join("src/lib/bar/Lib.kt"), "package bar\n\nclass Lib\n").unwrap();
}

fn tool() -> GradleTool {
    GradleTool::new().with_interpreter("sh")
}

fn all_tasks() -> Vec<TaskPath> {
    vec![
        TaskPath::new(":app:compileDebugKotlin"),
        TaskPath::new(":lib:compileDebugKotlin"),
    ]
}

#[tokio::test]
async fn build_then_up_to_date_then_rerun() -> Result<(), Error> {
    let templates = TempDir::new()?;
    write_template(templates.path(), "AndroidProject");
    let fixture = ProjectFixture::create(templates.path(), "AndroidProject", "3.3")?;
    let options = BuildOptions::default().with_plugin_version("2.3.0");
    let tasks = all_tasks();
    let build = [TaskPath::new("build")];

    let first = tool().execute(&fixture, &build, &options).await?;
    first
        .assert_successful()?
        .assert_tasks_executed(&tasks)?
        .check_kotlin_gradle_build_services()?;

    let second = tool().execute(&fixture, &build, &options).await?;
    second.assert_successful()?.assert_tasks_up_to_date(&tasks)?;
    assert!(second.assert_tasks_executed(&tasks[..1]).is_err());

    let rerun = options.clone().with_rerun_all(true);
    let third = tool().execute(&fixture, &build, &rerun).await?;
    third
        .assert_successful()?
        .assert_contains(&["--rerun-tasks"])?
        .assert_tasks_executed(&tasks)?
        .check_kotlin_gradle_build_services()?;

    assert!(!options.rerun_all);
    Ok(())
}

#[tokio::test]
async fn mutation_recompiles_only_the_dependent_module() -> Result<(), Error> {
    let templates = TempDir::new()?;
    write_template(templates.path(), "AndroidIncrementalSingleModuleProject");
    let fixture =
        ProjectFixture::create(templates.path(), "AndroidIncrementalSingleModuleProject", "3.3")?;
    let options = BuildOptions::default().with_incremental(true);
    let assemble = [TaskPath::new("assembleDebug")];

    tool()
        .execute(&fixture, &assemble, &options)
        .await?
        .assert_successful()?;

    let get_something = fixture.locate_file_by_suffix("getSomething.kt")?;
    fixture.write_file(&get_something, "package foo\n\nfun getSomething() = 10\n")?;

    let rebuilt = tool().execute(&fixture, &assemble, &options).await?;
    rebuilt
        .assert_successful()?
        .assert_contains(&["-Pkotlin.incremental=true"])?
        .assert_tasks_executed(&[TaskPath::new(":app:compileDebugKotlin")])?
        .assert_tasks_up_to_date(&[TaskPath::new(":lib:compileDebugKotlin")])?
        .assert_compiled_kotlin_sources(&fixture.relativize(&[get_something])?, SourceMatch::Exact)?
        .assert_compiled_kotlin_sources(&["src/app/foo/getSomething.kt"], SourceMatch::Weak)?;

    assert!(rebuilt
        .assert_compiled_kotlin_sources(&["src/app/foo/KotlinActivity1.kt"], SourceMatch::Exact)
        .is_err());
    Ok(())
}

#[tokio::test]
async fn modify_in_place_is_seen_by_next_build() -> Result<(), Error> {
    let templates = TempDir::new()?;
    write_template(templates.path(), "AndroidDaggerProject");
    let fixture = ProjectFixture::create(templates.path(), "AndroidDaggerProject", "3.3")?;
    let options = BuildOptions::default();
    let assemble = [TaskPath::new(":app:assembleDebug")];

    tool().execute(&fixture, &assemble, &options).await?.assert_successful()?;

    let lib = fixture.locate_file_by_name("Lib.kt")?;
    fixture.mutate_file(&lib, |text| text.replace("class Lib", "class Lib2"))?;

    tool()
        .execute(&fixture, &assemble, &options)
        .await?
        .assert_successful()?
        .assert_compiled_kotlin_sources(&fixture.relativize(&[lib])?, SourceMatch::Exact)?
        .assert_tasks_up_to_date(&[TaskPath::new(":app:compileDebugKotlin")])?;
    Ok(())
}

#[tokio::test]
async fn unsupported_toolchain_fails_with_diagnostic() -> Result<(), Error> {
    let templates = TempDir::new()?;
    write_template(templates.path(), "AndroidJackProject");
    fs::write(templates.path().join("AndroidJackProject/jack.enabled"), "")?;
    let fixture = ProjectFixture::create(templates.path(), "AndroidJackProject", "3.3")?;

    let invocation = tool()
        .execute(&fixture, &[TaskPath::new("assemble")], &BuildOptions::default())
        .await?;

    assert!(!invocation.exit_succeeded);
    invocation
        .assert_failed()?
        .assert_contains(&["Kotlin Gradle plugin does not support the deprecated Jack toolchain"])?;
    Ok(())
}

#[tokio::test]
async fn changing_dependencies_warning_detected_by_regex() -> Result<(), Error> {
    let pattern = "Changed dependencies of configuration .+ after it has been included in dependency resolution";

    let templates = TempDir::new()?;
    write_template(templates.path(), "AndroidKaptChangingDependencies");
    let fixture =
        ProjectFixture::create(templates.path(), "AndroidKaptChangingDependencies", "3.3")?;
    let clean = tool()
        .execute(&fixture, &[TaskPath::new("assembleDebug")], &BuildOptions::default())
        .await?;
    clean
        .assert_successful()?
        .assert_not_contains(OutputPattern::regex(pattern)?)?;

    fs::write(fixture.root().join("warn.enabled"), "")?;
    let noisy = tool()
        .execute(&fixture, &[TaskPath::new("assembleDebug")], &BuildOptions::default())
        .await?;
    let err = noisy
        .assert_not_contains(OutputPattern::regex(pattern)?)
        .unwrap_err();
    assert!(matches!(err, Error::Assertion(_)));
    Ok(())
}

#[tokio::test]
async fn yaml_scenario_runs_steps_in_order() {
    let templates = TempDir::new().unwrap();
    write_template(templates.path(), "AndroidProject");

    let yaml = r#"
name: up-to-date-then-mutate
project: AndroidProject
steps:
  - action: build
    tasks: [build]
    expect:
      success: true
      tasks_executed: [":app:compileDebugKotlin", ":lib:compileDebugKotlin"]
      build_services: true
      guarded_contains:
        - text: "BUILD SUCCESSFUL"
          known_issue: agp-skips-kotlin-unit-tests
  - action: build
    tasks: [build]
    expect:
      success: true
      tasks_up_to_date: [":app:compileDebugKotlin", ":lib:compileDebugKotlin"]
      not_matches: ["Changed dependencies of configuration .+"]
  - action: modify
    file_suffix: Activity1.kt
    replace: "class KotlinActivity1"
    with: "class KotlinActivity1 { val x = 1 }"
  - action: build
    tasks: [build]
    incremental: true
    expect:
      success: true
      contains: ["-Pkotlin.incremental=true"]
      tasks_up_to_date: [":lib:compileDebugKotlin"]
      compiled_kotlin:
        located: [KotlinActivity1.kt]
  - action: build
    tasks: [build]
    rerun_all: true
    expect:
      tasks_executed: [":app:compileDebugKotlin", ":lib:compileDebugKotlin"]
"#;
    let scenario = Scenario::from_yaml(yaml).unwrap();
    let config = HarnessConfig {
        templates_dir: templates.path().to_path_buf(),
        ..Default::default()
    };
    let runner = ScenarioRunner::new(Box::new(tool()), config);
    let entry = MatrixEntry::new("fake", "3.3", "2.3.0");

    let report = runner.run(&scenario, &entry).await;

    assert!(report.passed, "scenario failed: {:?}", report.error);
    assert_eq!(report.steps_completed, 5);
    assert!(report.fixture_root.is_none());
}

#[tokio::test]
async fn relative_sdk_and_default_logging_reach_the_build() {
    let templates = TempDir::new().unwrap();
    write_template(templates.path(), "AndroidProject");
    let sdk = tempfile::tempdir_in(".").unwrap();
    let sdk_name = sdk.path().file_name().unwrap().to_os_string();

    let yaml = r#"
name: environment
project: AndroidProject
steps:
  - action: build
    tasks: [build]
    expect:
      success: true
      contains: ["sdk: present", "--no-daemon", "--debug"]
      not_contains: ["-Pkotlin.incremental"]
"#;
    let scenario = Scenario::from_yaml(yaml).unwrap();
    let config = HarnessConfig {
        templates_dir: templates.path().to_path_buf(),
        android_home: sdk_name.into(),
        ..Default::default()
    };
    let runner = ScenarioRunner::new(Box::new(tool()), config);

    let report = runner.run(&scenario, &MatrixEntry::new("fake", "3.3", "2.3.0")).await;

    assert!(report.passed, "scenario failed: {:?}", report.error);
}

#[tokio::test]
async fn yaml_scenario_stops_at_first_failure() {
    let templates = TempDir::new().unwrap();
    write_template(templates.path(), "AndroidProject");

    let yaml = r#"
name: wrong-expectation
project: AndroidProject
steps:
  - action: build
    tasks: [build]
    expect:
      tasks_up_to_date: [":app:compileDebugKotlin"]
  - action: build
    tasks: [build]
"#;
    let scenario = Scenario::from_yaml(yaml).unwrap();
    let config = HarnessConfig {
        templates_dir: templates.path().to_path_buf(),
        ..Default::default()
    };
    let runner = ScenarioRunner::new(Box::new(tool()), config);

    let report = runner.run(&scenario, &MatrixEntry::new("fake", "3.3", "2.3.0")).await;

    assert!(!report.passed);
    assert_eq!(report.steps_completed, 0);
    let error = report.error.unwrap();
    assert!(error.contains(":app:compileDebugKotlin UP-TO-DATE"));
    assert!(error.contains("BUILD SUCCESSFUL"));
}

#[tokio::test]
async fn missing_template_fails_scenario() {
    let templates = TempDir::new().unwrap();
    let scenario = Scenario::from_yaml(
        "name: missing\nproject: DoesNotExist\nsteps:\n  - action: build\n    tasks: [build]\n",
    )
    .unwrap();
    let config = HarnessConfig {
        templates_dir: templates.path().to_path_buf(),
        ..Default::default()
    };
    let runner = ScenarioRunner::new(Box::new(tool()), config);

    let report = runner.run(&scenario, &MatrixEntry::new("fake", "3.3", "2.3.0")).await;

    assert!(!report.passed);
    assert!(report.error.unwrap().contains("DoesNotExist"));
}

#[test]
fn bundled_scenarios_parse() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("scenarios");
    let mut count = 0;
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            Scenario::load(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
            count += 1;
        }
    }
    assert!(count > 0);
}
