//! Cardinality checks on the remote tool's test setup
//!
//! Every check reads the counts fresh from the tool. Nothing is trusted from
//! an earlier call, since the tool's configuration can be replaced at any time
//! from its UI or by loading another file.

use crate::common::{Error, Result};
use crate::remote::{
    Application, ConfigurationReport, LoggingBlocks, Report, TestConfiguration,
    TestConfigurationSettings, TestEnvironment, TestModule, TestUnit,
};

pub const NOT_A_TEST_CONFIGURATION: &str = "not a test configuration";
pub const NOT_A_TEST_UNIT: &str = "not a test unit";
pub const NOT_A_LOGGING_BLOCK: &str = "not a logging block";

/// The single test environment and the test module carrying its tree
pub struct EnvironmentBinding {
    pub environment: Box<dyn TestEnvironment>,
    pub module: Box<dyn TestModule>,
}

/// The single test configuration and the single unit inside it
pub struct ConfigurationBinding {
    pub configuration: Box<dyn TestConfiguration>,
    pub settings: Box<dyn TestConfigurationSettings>,
    pub report: Box<dyn ConfigurationReport>,
    pub unit: Box<dyn TestUnit>,
    pub unit_report: Box<dyn Report>,
}

/// Fail with `message` unless `count` is exactly one
pub fn exactly_one(what: &str, count: usize, message: &str) -> Result<()> {
    if count == 1 {
        return Ok(());
    }

    tracing::warn!(what, count, "Cardinality check failed");
    Err(Error::invariant(&format!(
        "{}: expected exactly one {}, found {}",
        message, what, count
    )))
}

/// Require exactly one test environment and bind its first test module
pub fn check_environment(app: &dyn Application) -> Result<EnvironmentBinding> {
    let environments = app.configuration()?.test_environments()?;
    exactly_one("test environment", environments.count()?, NOT_A_TEST_CONFIGURATION)?;

    let environment = environments.item(0)?;
    if environment.module_count()? == 0 {
        return Err(Error::Structure(format!(
            "test environment '{}' has no test module",
            environment.name()?
        )));
    }
    let module = environment.module(0)?;

    tracing::debug!(
        environment = %environment.name()?,
        module = %module.name()?,
        "Bound test environment"
    );

    Ok(EnvironmentBinding {
        environment,
        module,
    })
}

/// Require exactly one test configuration holding exactly one test unit
pub fn check_configuration(app: &dyn Application) -> Result<ConfigurationBinding> {
    let configurations = app.configuration()?.test_configurations()?;
    exactly_one(
        "test configuration",
        configurations.count()?,
        NOT_A_TEST_CONFIGURATION,
    )?;

    let configuration = configurations.item(0)?;
    let settings = configuration.settings()?;
    let report = configuration.report()?;

    let units = configuration.units()?;
    exactly_one("test unit", units.count()?, NOT_A_TEST_UNIT)?;
    let unit = units.item(0)?;
    let unit_report = unit.report()?;

    tracing::debug!(
        configuration = %configuration.name()?,
        unit = %unit.name()?,
        "Bound test configuration"
    );

    Ok(ConfigurationBinding {
        configuration,
        settings,
        report,
        unit,
        unit_report,
    })
}

/// Require exactly one logging block in the online setup
pub fn check_logging(app: &dyn Application) -> Result<Box<dyn LoggingBlocks>> {
    let blocks = app.configuration()?.logging_blocks()?;
    exactly_one("logging block", blocks.count()?, NOT_A_LOGGING_BLOCK)?;
    Ok(blocks)
}
