//! Test runner implementation
//!
//! Executes test scenarios step by step against a session, asserting on
//! the structured results rather than on CLI output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;

use crate::bridge::BridgeClient;
use crate::common::{Error, Result};
use crate::engine::Session;
use crate::remote::memory::{MemoryTool, Snapshot};
use crate::remote::Application;

use super::config::{ListExpectation, StepExpectation, TargetConfig, TestScenario, TestStep};

/// Poll interval while a `wait` step watches the measurement
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Result of a test run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// Run a test scenario from a YAML file
pub fn run_scenario(path: &Path, verbose: bool) -> Result<TestResult> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read test scenario '{}': {}",
            path.display(),
            e
        ))
    })?;

    let scenario: TestScenario = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))?;

    let steps_total = scenario.steps.len();

    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        scenario.name.white().bold()
    );

    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }

    let scenario_dir = path.parent().unwrap_or(Path::new("."));
    let app = connect_target(&scenario.target, scenario_dir, verbose)?;
    let mut session = Session::with_application(app);

    println!("\n{}", "Steps:".cyan());

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        if let Err(e) = execute_step(&mut session, step, step_num, verbose) {
            println!("  {} Step {}: {}", "✗".red(), step_num, e);
            tracing::debug!(step = step_num, error = %e, "Scenario step failed");

            return Ok(TestResult {
                name: scenario.name.clone(),
                passed: false,
                steps_run: step_num,
                steps_total,
                error: Some(e.to_string()),
            });
        }
    }

    println!(
        "\n{} {}\n",
        "✓".green().bold(),
        "Test Passed".green().bold()
    );

    Ok(TestResult {
        name: scenario.name,
        passed: true,
        steps_run: steps_total,
        steps_total,
        error: None,
    })
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

fn connect_target(target: &TargetConfig, dir: &Path, verbose: bool) -> Result<Box<dyn Application>> {
    match (&target.snapshot, &target.bridge) {
        (Some(snapshot), None) => {
            let snapshot = resolve(dir, snapshot);
            if verbose {
                println!("  Snapshot: {}", snapshot.display().to_string().dimmed());
            }
            // Scenario runs never write back to their fixtures
            Ok(Box::new(MemoryTool::new(Snapshot::load(&snapshot)?)))
        }
        (None, Some(bridge)) => {
            let bridge = resolve(dir, bridge);
            if verbose {
                println!("  Bridge: {}", bridge.display().to_string().dimmed());
            }
            Ok(BridgeClient::spawn(&bridge, &target.args)?.into_application())
        }
        _ => Err(Error::Config(
            "Scenario target needs exactly one of 'snapshot' or 'bridge'".to_string(),
        )),
    }
}

/// Execute a single test step
fn execute_step(session: &mut Session, step: &TestStep, step_num: usize, verbose: bool) -> Result<()> {
    match step {
        TestStep::Open { path, expect } => {
            let result = session.open_configuration(path);
            expect_outcome(&format!("open {}", path.display()), result, expect.as_ref(), step_num)
        }
        TestStep::LoadEnvironment {
            path,
            power_on,
            expect,
        } => {
            let result = session.load_test_environment(path, *power_on);
            let variant = if *power_on { "PowerOn" } else { "PowerOff" };
            expect_outcome(
                &format!("load environment {} ({})", path.display(), variant),
                result,
                expect.as_ref(),
                step_num,
            )
        }
        TestStep::RemoveEnvironment { expect } => {
            let result = session.remove_test_environment();
            expect_outcome("remove environment", result, expect.as_ref(), step_num)
        }
        TestStep::LoadConfiguration { path, expect } => {
            let result = session.load_test_configuration(path);
            expect_outcome(
                &format!("load configuration {}", path.display()),
                result,
                expect.as_ref(),
                step_num,
            )
        }
        TestStep::Enable { test_case, expect } => {
            let result = session.enable_test_case(test_case);
            expect_outcome(&format!("enable {}", test_case), result, expect.as_ref(), step_num)
        }
        TestStep::List { expect } => execute_list_step(session, expect.as_ref(), step_num, verbose),
        TestStep::SetReport { path, expect } => {
            let result = session.set_report_path(path);
            expect_outcome(&format!("set report {}", path.display()), result, expect.as_ref(), step_num)
        }
        TestStep::SetTrigger { variable, expect } => {
            let result = session.set_trigger_variable(variable);
            expect_outcome(&format!("set trigger {}", variable), result, expect.as_ref(), step_num)
        }
        TestStep::ImportVariant { path, expect } => {
            let result = session.import_variant_profile(path);
            expect_outcome(
                &format!("import variant {}", path.display()),
                result,
                expect.as_ref(),
                step_num,
            )
        }
        TestStep::SetLogging { name, expect } => {
            let result = session.set_logging_target(name);
            expect_outcome(&format!("set logging {}", name), result, expect.as_ref(), step_num)
        }
        TestStep::Mappings { path, expect } => {
            let result = session.append_symbol_mappings(path);
            expect_outcome(&format!("mappings {}", path.display()), result, expect.as_ref(), step_num)
        }
        TestStep::SetVariable {
            namespace,
            name,
            value,
            expect,
        } => {
            let result = session.set_variable(namespace, name, value.clone());
            expect_outcome(
                &format!("set {}::{} = {}", namespace, name, value),
                result,
                expect.as_ref(),
                step_num,
            )
        }
        TestStep::StartMeasurement => {
            session.start_measurement()?;
            pass(step_num, "start measurement");
            Ok(())
        }
        TestStep::StopMeasurement => {
            session.stop_measurement()?;
            pass(step_num, "stop measurement");
            Ok(())
        }
        TestStep::Run { expect } => {
            let result = session.run_test_unit();
            expect_outcome("run test unit", result, expect.as_ref(), step_num)
        }
        TestStep::RunModule { expect } => {
            let result = session.run_test_module();
            expect_outcome("run test module", result, expect.as_ref(), step_num)
        }
        TestStep::Wait { timeout } => {
            let timeout = Duration::from_secs(timeout.unwrap_or(30));
            let elapsed = session.wait_until_stopped(timeout, WAIT_POLL)?;
            pass(
                step_num,
                &format!("wait (stopped after {:.1}s)", elapsed.as_secs_f64()),
            );
            Ok(())
        }
        TestStep::ExpectVerdict {
            configuration,
            equals,
        } => {
            let configuration = match configuration {
                Some(name) => name.clone(),
                None => session.check_configuration()?.configuration.name()?,
            };
            let verdict = session.verdict(&configuration)?;
            if &verdict != equals {
                return Err(Error::TestAssertion(format!(
                    "Expected verdict {} for '{}', got {}",
                    equals, configuration, verdict
                )));
            }
            pass(step_num, &format!("verdict {} = {}", configuration, verdict));
            Ok(())
        }
        TestStep::ExpectState { state } => {
            let actual = session.state().to_string();
            if &actual != state {
                return Err(Error::TestAssertion(format!(
                    "Expected session state '{}', got '{}'",
                    state, actual
                )));
            }
            pass(step_num, &format!("state {}", actual));
            Ok(())
        }
        TestStep::Save => {
            session.save_configuration()?;
            pass(step_num, "save");
            Ok(())
        }
    }
}

fn pass(step_num: usize, label: &str) {
    println!("  {} Step {}: {}", "✓".green(), step_num, label.dimmed());
}

/// Check a step result against its expectation
fn expect_outcome(
    label: &str,
    result: Result<()>,
    expect: Option<&StepExpectation>,
    step_num: usize,
) -> Result<()> {
    let should_succeed = expect
        .map(|e| {
            e.success
                .unwrap_or(e.error.is_none() && e.message_contains.is_none())
        })
        .unwrap_or(true);

    match (result, should_succeed) {
        (Ok(()), true) => {
            pass(step_num, label);
            Ok(())
        }
        (Ok(()), false) => Err(Error::TestAssertion(format!(
            "'{}' expected to fail, but succeeded",
            label
        ))),
        (Err(e), true) => Err(e),
        (Err(e), false) => {
            if let Some(code) = expect.and_then(|x| x.error.as_deref()) {
                if e.code() != code {
                    return Err(Error::TestAssertion(format!(
                        "'{}' expected error {}, got {}: {}",
                        label,
                        code,
                        e.code(),
                        e
                    )));
                }
            }
            if let Some(fragment) = expect.and_then(|x| x.message_contains.as_deref()) {
                if !e.to_string().contains(fragment) {
                    return Err(Error::TestAssertion(format!(
                        "'{}' error should contain '{}', got: {}",
                        label, fragment, e
                    )));
                }
            }
            println!(
                "  {} Step {}: {} (expected failure: {})",
                "✓".green(),
                step_num,
                label.dimmed(),
                e.code()
            );
            Ok(())
        }
    }
}

fn execute_list_step(
    session: &mut Session,
    expect: Option<&ListExpectation>,
    step_num: usize,
    verbose: bool,
) -> Result<()> {
    let captions = session
        .list_test_cases()?
        .collect::<Result<Vec<String>>>()?;

    if verbose {
        for caption in &captions {
            println!("      {}", caption.dimmed());
        }
    }

    if let Some(exp) = expect {
        if let Some(expected) = &exp.equals {
            if &captions != expected {
                return Err(Error::TestAssertion(format!(
                    "Expected test cases {:?}, got {:?}",
                    expected, captions
                )));
            }
        }

        if let Some(required) = &exp.contains {
            if let Some(missing) = required.iter().find(|c| !captions.contains(c)) {
                return Err(Error::TestAssertion(format!(
                    "Test case '{}' not listed; got {:?}",
                    missing, captions
                )));
            }
        }

        if let Some(count) = exp.count {
            if captions.len() != count {
                return Err(Error::TestAssertion(format!(
                    "Expected {} test cases, got {}",
                    count,
                    captions.len()
                )));
            }
        }
    }

    pass(step_num, &format!("list ({} test cases)", captions.len()));
    Ok(())
}
