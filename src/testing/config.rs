//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use std::path::PathBuf;

use crate::remote::VariableValue;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Tool the scenario runs against
    pub target: TargetConfig,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// Tool the scenario runs against
///
/// Exactly one of `snapshot` and `bridge` must be set. Relative paths are
/// resolved against the scenario file.
#[derive(Deserialize, Debug, Default)]
pub struct TargetConfig {
    /// Simulate the tool from this snapshot; it is never written back
    pub snapshot: Option<PathBuf>,
    /// Bridge executable to spawn
    pub bridge: Option<PathBuf>,
    /// Arguments for the bridge
    #[serde(default)]
    pub args: Vec<String>,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Open a configuration file
    Open {
        path: PathBuf,
        expect: Option<StepExpectation>,
    },
    /// Load a test environment and select its power variant
    LoadEnvironment {
        path: PathBuf,
        #[serde(default = "default_power_on")]
        power_on: bool,
        expect: Option<StepExpectation>,
    },
    /// Remove every test environment
    RemoveEnvironment { expect: Option<StepExpectation> },
    /// Replace the test configurations with one holding this unit
    LoadConfiguration {
        path: PathBuf,
        expect: Option<StepExpectation>,
    },
    /// Enable exactly one test case
    Enable {
        test_case: String,
        expect: Option<StepExpectation>,
    },
    /// List test cases and compare them
    List { expect: Option<ListExpectation> },
    SetReport {
        path: PathBuf,
        expect: Option<StepExpectation>,
    },
    SetTrigger {
        variable: String,
        expect: Option<StepExpectation>,
    },
    ImportVariant {
        path: PathBuf,
        expect: Option<StepExpectation>,
    },
    SetLogging {
        name: String,
        expect: Option<StepExpectation>,
    },
    Mappings {
        path: PathBuf,
        expect: Option<StepExpectation>,
    },
    SetVariable {
        namespace: String,
        name: String,
        value: VariableValue,
        expect: Option<StepExpectation>,
    },
    StartMeasurement,
    StopMeasurement,
    /// Start the bound test unit
    Run { expect: Option<StepExpectation> },
    /// Start the bound test module
    RunModule { expect: Option<StepExpectation> },
    /// Wait for the measurement to stop
    Wait {
        /// Timeout in seconds (default: 30)
        timeout: Option<u64>,
    },
    /// Check the verdict summary of a test configuration
    ExpectVerdict {
        /// Test configuration name (default: the bound one)
        configuration: Option<String>,
        equals: VariableValue,
    },
    /// Check the session state
    ExpectState { state: String },
    Save,
}

fn default_power_on() -> bool {
    true
}

/// Expectations for a step result
#[derive(Deserialize, Debug)]
pub struct StepExpectation {
    /// Whether the step should succeed
    pub success: Option<bool>,
    /// Error code the step should fail with
    pub error: Option<String>,
    /// Substring that should be in the error message
    pub message_contains: Option<String>,
}

/// Expectations for a test case listing
#[derive(Deserialize, Debug)]
pub struct ListExpectation {
    /// Exact captions, in order
    pub equals: Option<Vec<String>>,
    /// Captions that must be present
    pub contains: Option<Vec<String>>,
    /// Number of test cases
    pub count: Option<usize>,
}
