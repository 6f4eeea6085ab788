//! Build Scenario Harness CLI
//!
//! Runs YAML build scenarios across their version matrix.

use std::path::PathBuf;

use scenario_harness::{GradleTool, HarnessConfig, Scenario, ScenarioReport, ScenarioRunner};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut config_path = PathBuf::from("harness.toml");
    let mut json = false;
    let mut scenario_paths = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = PathBuf::from(path),
                None => usage_and_exit(),
            },
            "--json" => json = true,
            "-h" | "--help" => usage_and_exit(),
            _ => scenario_paths.push(PathBuf::from(arg)),
        }
    }

    if scenario_paths.is_empty() {
        usage_and_exit();
    }

    let config = match HarnessConfig::discover(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(warning = %warning, "harness configuration");
            }
        }
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    }

    let mut tool = GradleTool::new();
    if let Some(gradle) = &config.gradle_executable {
        tool = tool.with_fallback(gradle.clone());
    }
    let runner = ScenarioRunner::new(Box::new(tool), config);

    let mut reports: Vec<ScenarioReport> = Vec::new();
    for path in &scenario_paths {
        let scenario = match Scenario::load(path) {
            Ok(scenario) => scenario,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(2);
            }
        };
        let matrix = scenario.matrix.matrix();
        reports.extend(runner.run_matrix(&scenario, &matrix).await);
    }

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                eprintln!("Failed to render report: {}", e);
                std::process::exit(2);
            }
        }
    } else {
        print_summary(&reports);
    }

    if reports.iter().any(|report| !report.passed) {
        std::process::exit(1);
    }
}

fn print_summary(reports: &[ScenarioReport]) {
    println!("\n{}", "=".repeat(60));
    println!("Scenario Results");
    println!("{}", "=".repeat(60));

    for report in reports {
        let status = if report.passed { "PASS" } else { "FAIL" };
        println!(
            "[{}] {} @ {} ({} steps, {:?})",
            status, report.scenario, report.entry, report.steps_completed, report.duration
        );
        if let Some(root) = &report.fixture_root {
            println!("  fixture kept at {}", root.display());
        }
        if let Some(error) = &report.error {
            for line in error.lines() {
                println!("  {}", line);
            }
        }
    }

    let passed = reports.iter().filter(|report| report.passed).count();
    println!();
    println!("{} of {} passed", passed, reports.len());
}

fn usage_and_exit() -> ! {
    eprintln!("Usage: build-scenario-harness [--config <harness.toml>] [--json] <scenario.yaml>...");
    eprintln!("\nRuns each scenario against its Gradle / Android plugin version matrix.");
    eprintln!("\nEnvironment variables:");
    eprintln!("  HARNESS_TEMPLATES_DIR   Fixture template directory");
    eprintln!("  HARNESS_ANDROID_HOME    Android SDK location");
    eprintln!("  HARNESS_GRADLE          Gradle executable for fixtures without gradlew");
    eprintln!("  HARNESS_TIMEOUT_SECS    Per-build timeout");
    eprintln!("  HARNESS_KEEP_FIXTURES=1 Keep fixture directories");
    eprintln!("  HARNESS_DEBUG=1         Log every build output line");
    std::process::exit(2);
}
