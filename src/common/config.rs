//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;

/// Name the bridge helper is looked up under when no path is configured
pub const DEFAULT_BRIDGE: &str = "canoe-bridge";

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Automation bridge settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Remote application settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Measurement and verdict timing
    #[serde(default)]
    pub run: RunConfig,
}

/// Configuration for the automation bridge helper process
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BridgeConfig {
    /// Path to the bridge executable
    pub path: Option<PathBuf>,

    /// Additional arguments to pass to the bridge
    #[serde(default)]
    pub args: Vec<String>,
}

/// Remote application settings
#[derive(Debug, Deserialize)]
pub struct ApplicationConfig {
    /// Show the tool's main window while it is automated
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            visible: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Run timing settings
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Seconds a plain `run` keeps the measurement going
    #[serde(default = "default_measurement")]
    pub measurement_secs: u64,

    /// Interval between `running` polls while waiting for a test to finish
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on the wait for a test unit to finish
    #[serde(default = "default_verdict_timeout")]
    pub verdict_timeout_secs: u64,

    /// Namespace the verdict summary is read from
    #[serde(default = "default_test_configuration")]
    pub test_configuration: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            measurement_secs: default_measurement(),
            poll_interval_ms: default_poll_interval(),
            verdict_timeout_secs: default_verdict_timeout(),
            test_configuration: default_test_configuration(),
        }
    }
}

fn default_measurement() -> u64 {
    4
}
fn default_poll_interval() -> u64 {
    500
}
fn default_verdict_timeout() -> u64 {
    600
}
fn default_test_configuration() -> String {
    "Test_Configuration_1".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Resolve the bridge executable
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn bridge_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.bridge.path {
            return Ok(path.clone());
        }

        which::which(DEFAULT_BRIDGE)
            .map_err(|_| super::Error::bridge_not_found(DEFAULT_BRIDGE, &["config.toml [bridge].path", "PATH"]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::parse("").unwrap();
        assert!(config.application.visible);
        assert_eq!(config.run.measurement_secs, 4);
        assert_eq!(config.run.test_configuration, "Test_Configuration_1");
        assert!(config.bridge.path.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [bridge]
            path = "/opt/bridge/canoe-bridge"
            args = ["--visible"]

            [run]
            poll_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(
            config.bridge_path().unwrap(),
            PathBuf::from("/opt/bridge/canoe-bridge")
        );
        assert_eq!(config.bridge.args, vec!["--visible".to_string()]);
        assert_eq!(config.run.poll_interval_ms, 100);
        assert_eq!(config.run.verdict_timeout_secs, 600);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::parse("[run\nmeasurement_secs = ").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }
}
