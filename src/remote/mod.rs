//! Capability interfaces onto the remote tool's object graph
//!
//! The automated tool exposes a large property/method bag. Only the narrow
//! slice this crate needs is modelled here, one trait per entity, so the
//! engine can run against the live tool (through [`crate::bridge`]) or the
//! in-memory model in [`memory`].
//!
//! Handles are transient: they are fetched, used for one operation and
//! dropped. Collections are indexed from zero. Mutating methods take `&self`
//! because the state lives on the far side of the handle.

pub mod memory;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Variable holding the verdict summary, namespaced by test configuration
pub const VERDICT_VARIABLE: &str = "VerdictSummary";

/// Boxed reference to a test element
pub type ElementRef = Box<dyn TestElement>;

/// A value held in the remote variable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for VariableValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Root object of the remote tool
pub trait Application {
    /// Open a configuration file, replacing the current one
    fn open(&self, path: &Path) -> Result<()>;
    fn set_visible(&self, visible: bool) -> Result<()>;
    fn quit(&self) -> Result<()>;
    fn configuration(&self) -> Result<Box<dyn Configuration>>;
    fn measurement(&self) -> Result<Box<dyn Measurement>>;
    fn variables(&self) -> Result<Box<dyn VariableStore>>;
}

/// Measurement control
pub trait Measurement {
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn is_running(&self) -> Result<bool>;
}

/// Namespaced system variable store
pub trait VariableStore {
    fn get(&self, namespace: &str, name: &str) -> Result<VariableValue>;
    fn set(&self, namespace: &str, name: &str, value: VariableValue) -> Result<()>;
}

/// The currently open configuration
pub trait Configuration {
    /// Configuration name, without directory or extension
    fn name(&self) -> Result<String>;
    fn save(&self) -> Result<()>;
    fn test_environments(&self) -> Result<Box<dyn TestEnvironments>>;
    fn test_configurations(&self) -> Result<Box<dyn TestConfigurations>>;
    fn symbol_mappings(&self) -> Result<Box<dyn SymbolMappings>>;
    fn logging_blocks(&self) -> Result<Box<dyn LoggingBlocks>>;
}

/// Collection of test environments in the test setup
pub trait TestEnvironments {
    fn count(&self) -> Result<usize>;
    fn item(&self, index: usize) -> Result<Box<dyn TestEnvironment>>;
    /// Add an environment from a `.tse` file
    fn add(&self, path: &Path) -> Result<()>;
    fn remove(&self, index: usize) -> Result<()>;
}

pub trait TestEnvironment {
    fn name(&self) -> Result<String>;
    fn module_count(&self) -> Result<usize>;
    fn module(&self, index: usize) -> Result<Box<dyn TestModule>>;
}

/// A test module inside a test environment
pub trait TestModule {
    fn name(&self) -> Result<String>;
    fn elements(&self) -> Result<Vec<ElementRef>>;
    fn report(&self) -> Result<Box<dyn Report>>;
    fn start(&self) -> Result<()>;
}

/// Collection of test configurations
pub trait TestConfigurations {
    fn count(&self) -> Result<usize>;
    fn item(&self, index: usize) -> Result<Box<dyn TestConfiguration>>;
    /// Create a new, empty test configuration
    fn add(&self) -> Result<Box<dyn TestConfiguration>>;
    fn remove(&self, index: usize) -> Result<()>;
}

pub trait TestConfiguration {
    fn name(&self) -> Result<String>;
    fn settings(&self) -> Result<Box<dyn TestConfigurationSettings>>;
    fn report(&self) -> Result<Box<dyn ConfigurationReport>>;
    fn units(&self) -> Result<Box<dyn TestUnits>>;
    /// Queue a variant profile import; the tool applies it asynchronously
    fn import_variant_profiles(&self, path: &Path) -> Result<()>;
}

pub trait TestConfigurationSettings {
    fn start_on_sys_var(&self) -> Result<String>;
    fn set_start_on_sys_var(&self, variable: &str) -> Result<()>;
    fn ignore_break_on_fail(&self) -> Result<bool>;
    fn set_ignore_break_on_fail(&self, ignore: bool) -> Result<()>;
}

/// Report settings of a whole test configuration
pub trait ConfigurationReport {
    fn use_joint_report(&self) -> Result<bool>;
    fn set_use_joint_report(&self, joint: bool) -> Result<()>;
}

/// Collection of test units in a test configuration
pub trait TestUnits {
    fn count(&self) -> Result<usize>;
    fn item(&self, index: usize) -> Result<Box<dyn TestUnit>>;
    /// Add a unit from a `.vtuexe` file
    fn add(&self, path: &Path) -> Result<()>;
}

pub trait TestUnit {
    fn name(&self) -> Result<String>;
    fn elements(&self) -> Result<Vec<ElementRef>>;
    fn report(&self) -> Result<Box<dyn Report>>;
    fn start(&self) -> Result<()>;
}

/// Report descriptor of a test unit or test module
pub trait Report {
    fn is_enabled(&self) -> Result<bool>;
    fn set_enabled(&self, enabled: bool) -> Result<()>;
    fn full_path(&self) -> Result<String>;
    fn set_full_path(&self, path: &str) -> Result<()>;
}

/// A node of the test tree: a group, a fixture or a test case
pub trait TestElement {
    fn caption(&self) -> Result<String>;
    fn children(&self) -> Result<Vec<ElementRef>>;
    fn is_enabled(&self) -> Result<bool>;
    fn set_enabled(&self, enabled: bool) -> Result<()>;
}

pub trait SymbolMappings {
    /// Drop every mapping currently loaded
    fn clear(&self) -> Result<()>;
    /// Append a mapping file, returning the tool's diagnostic text
    fn append(&self, path: &Path) -> Result<String>;
}

/// Logging blocks of the online setup
pub trait LoggingBlocks {
    fn count(&self) -> Result<usize>;
    fn full_name(&self, index: usize) -> Result<String>;
    fn set_full_name(&self, index: usize, name: &str) -> Result<()>;
}
