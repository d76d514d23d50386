//! End-to-end integration tests for the canoe CLI
//!
//! These tests verify the complete workflow by:
//! 1. Running YAML scenarios against the simulated tool and through the
//!    mock bridge process
//! 2. Running the `canoe` binary against a snapshot copy, one command per
//!    invocation, and checking what each command persisted

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

/// Test context with paths and cleanup
struct TestContext {
    /// Temporary directory for this test, removed on drop
    temp_dir: tempfile::TempDir,
    /// Config directory (XDG_CONFIG_HOME)
    config_dir: PathBuf,
    /// Path to fixtures directory
    fixtures_dir: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self {
            temp_dir,
            config_dir,
            fixtures_dir,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Copy the bench snapshot into the temp dir; commands may write it back
    fn bench_snapshot(&self) -> PathBuf {
        let copy = self.path("bench.yaml");
        fs::copy(self.fixtures_dir.join("bench.yaml"), &copy).expect("Failed to copy snapshot");
        copy
    }

    /// Point the CLI at the mock bridge serving `snapshot`
    fn create_config(&self, snapshot: &Path) {
        let config_content = format!(
            r#"
[bridge]
path = "{bridge}"
args = ["{snapshot}"]

[application]
visible = false

[run]
poll_interval_ms = 10
verdict_timeout_secs = 5
"#,
            bridge = mock_bridge().display(),
            snapshot = snapshot.display(),
        );

        let config_path = self.config_dir.join("canoe-cli").join("config.toml");
        fs::create_dir_all(config_path.parent().unwrap()).expect("Failed to create config dir");
        fs::write(&config_path, config_content).expect("Failed to write config");
    }

    /// Run a canoe command
    fn run_canoe(&self, args: &[&str]) -> CanoeOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_canoe"))
            .args(args)
            .env("XDG_CONFIG_HOME", &self.config_dir)
            .env("XDG_DATA_HOME", self.path("data"))
            .env("NO_COLOR", "1")
            .output()
            .expect("Failed to run canoe");

        CanoeOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }

    /// Run canoe expecting success
    fn run_canoe_ok(&self, args: &[&str]) -> String {
        let output = self.run_canoe(args);
        assert!(
            output.success,
            "canoe {:?} failed:\nstdout: {}\nstderr: {}",
            args,
            output.stdout,
            output.stderr
        );
        output.stdout
    }

    /// Run canoe with `--json` expecting success and parse its output
    fn run_canoe_json(&self, args: &[&str]) -> Value {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        let stdout = self.run_canoe_ok(&full);
        serde_json::from_str(&stdout).expect("canoe printed invalid JSON")
    }
}

/// Output from a canoe command
#[derive(Debug)]
struct CanoeOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

fn mock_bridge() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mock-bridge"))
}

/// Captions of enabled leaves in the first test unit of a snapshot file
fn enabled_leaves(snapshot: &Path) -> Vec<String> {
    let content = fs::read_to_string(snapshot).expect("Failed to read snapshot");
    let snapshot: canoe::remote::memory::Snapshot =
        serde_yaml::from_str(&content).expect("Invalid snapshot");

    fn walk(element: &canoe::remote::memory::ElementSpec, out: &mut Vec<String>) {
        if element.children.is_empty() {
            if element.enabled {
                out.push(element.caption.clone());
            }
        } else {
            for child in &element.children {
                walk(child, out);
            }
        }
    }

    let mut out = Vec::new();
    for element in &snapshot.test_configurations[0].units[0].elements {
        walk(element, &mut out);
    }
    out
}

// === Scenarios ===

#[test]
fn test_workflow_scenario_simulated() {
    let ctx = TestContext::new();
    let result = canoe::testing::run_scenario(&ctx.fixtures_dir.join("workflow.yaml"), true)
        .expect("Scenario could not be run");

    assert!(result.passed, "Scenario failed: {:?}", result.error);
    assert_eq!(result.steps_run, result.steps_total);
}

#[test]
fn test_workflow_scenario_through_bridge() {
    let ctx = TestContext::new();
    let snapshot = ctx.bench_snapshot();

    // Same steps, but the target is the mock bridge process
    let content = fs::read_to_string(ctx.fixtures_dir.join("workflow.yaml")).unwrap();
    let mut scenario: serde_yaml::Value = serde_yaml::from_str(&content).unwrap();
    scenario["target"] = serde_yaml::from_str(&format!(
        "bridge: \"{}\"\nargs: [\"{}\"]",
        mock_bridge().display(),
        snapshot.display()
    ))
    .unwrap();

    let scenario_path = ctx.path("workflow.yaml");
    fs::write(&scenario_path, serde_yaml::to_string(&scenario).unwrap()).unwrap();

    let result = canoe::testing::run_scenario(&scenario_path, false).unwrap();
    assert!(result.passed, "Scenario failed: {:?}", result.error);
}

// === CLI against a snapshot ===

#[test]
fn test_cli_simulated_workflow() {
    let ctx = TestContext::new();
    let snapshot = ctx.bench_snapshot();
    let sim = snapshot.to_str().unwrap();

    ctx.run_canoe_ok(&["--simulate", sim, "load-env", "bench.tse"]);
    ctx.run_canoe_ok(&[
        "--simulate",
        sim,
        "load-unit",
        "body.vtuexe",
        "--trigger",
        "Bench::Start",
    ]);

    let list = ctx.run_canoe_json(&["--simulate", sim, "list"]);
    assert_eq!(
        list["test_cases"],
        serde_json::json!(["Lock", "Unlock", "Sleep"])
    );

    // The selection is saved into the snapshot
    ctx.run_canoe_ok(&["--simulate", sim, "enable", "Unlock"]);
    assert_eq!(enabled_leaves(&snapshot), vec!["Unlock"]);

    let status = ctx.run_canoe_json(&["--simulate", sim, "status"]);
    assert_eq!(status["environment"]["name"], "Bench");
    assert_eq!(status["test_configuration"]["unit"], "Body");
    assert_eq!(status["test_configuration"]["trigger"], "Bench::Start");

    let executed = ctx.run_canoe_json(&["--simulate", sim, "execute", "Sleep", "--timeout", "5"]);
    assert_eq!(executed["verdict"], 1);
    assert_eq!(executed["configuration"], "Test_Configuration_1");
}

#[test]
fn test_cli_reports_error_codes() {
    let ctx = TestContext::new();
    let snapshot = ctx.bench_snapshot();
    let sim = snapshot.to_str().unwrap();

    ctx.run_canoe_ok(&["--simulate", sim, "load-unit", "body.vtuexe"]);

    let output = ctx.run_canoe(&["--json", "--simulate", sim, "enable", "Nope"]);
    assert!(!output.success);
    let error: Value = serde_json::from_str(output.stdout.trim()).unwrap();
    assert_eq!(error["error"]["code"], "NO_SELECTION");

    let output = ctx.run_canoe(&["--simulate", sim, "load-env", "bench.xml"]);
    assert!(!output.success);
    assert!(output.stderr.contains("not a test environment file"));

    // Failed commands did not save anything
    assert!(enabled_leaves(&snapshot).is_empty());
}

// === CLI through the bridge ===

#[test]
fn test_cli_through_mock_bridge() {
    let ctx = TestContext::new();
    let snapshot = ctx.bench_snapshot();
    ctx.create_config(&snapshot);

    ctx.run_canoe_ok(&["--cfg", "bench.cfg", "load-env", "bench.tse", "--power-off"]);
    ctx.run_canoe_ok(&["load-unit", "body.vtuexe"]);
    ctx.run_canoe_ok(&["enable", "Unlock"]);

    // Saved through the bridge into the snapshot the bridge serves
    assert_eq!(enabled_leaves(&snapshot), vec!["Unlock"]);

    let executed = ctx.run_canoe_json(&["execute", "Unlock"]);
    assert_eq!(executed["verdict"], 3);

    let status = ctx.run_canoe_json(&["status"]);
    assert_eq!(status["state"], "fully-bound");
    assert_eq!(status["environment"]["module"], "BenchControl");
}

#[test]
fn test_cli_missing_bridge() {
    let ctx = TestContext::new();
    let config_path = ctx.config_dir.join("canoe-cli").join("config.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, "[bridge]\npath = \"/nonexistent/canoe-bridge\"\n").unwrap();

    let output = ctx.run_canoe(&["--json", "list"]);
    assert!(!output.success);
    let error: Value = serde_json::from_str(output.stdout.trim()).unwrap();
    assert_eq!(error["error"]["code"], "BRIDGE_ERROR");
}
