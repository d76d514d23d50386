//! In-memory model of the remote tool
//!
//! Implements every capability trait against plain data, so the engine can be
//! exercised without the live tool: unit tests build a [`Snapshot`] in code,
//! `--simulate` runs and the mock bridge load one from YAML or TOML.
//!
//! Files referenced by path (environments, test units, symbol mappings) are
//! resolved through the snapshot's [`Catalog`] rather than the file system.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::common::{paths, Error, Result};

use super::{
    Application, Configuration, ConfigurationReport, ElementRef, LoggingBlocks, Measurement,
    Report, SymbolMappings, TestConfiguration, TestConfigurationSettings, TestConfigurations,
    TestElement, TestEnvironment, TestEnvironments, TestModule, TestUnit, TestUnits,
    VariableStore, VariableValue, VERDICT_VARIABLE,
};

type Shared<T> = Rc<RefCell<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

fn default_true() -> bool {
    true
}

// === Snapshot format ===

/// Serializable state of the whole tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Name of the open configuration
    #[serde(default)]
    pub name: String,
    /// Stop the measurement once a started test unit has finished
    #[serde(default = "default_true")]
    pub stop_after_test: bool,
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default)]
    pub test_configurations: Vec<ConfigurationSpec>,
    #[serde(default)]
    pub catalog: Catalog,
    /// Variables by namespace, then by name
    #[serde(default)]
    pub variables: BTreeMap<String, BTreeMap<String, VariableValue>>,
    #[serde(default)]
    pub logging_blocks: Vec<String>,
    #[serde(default)]
    pub symbol_mappings: Vec<PathBuf>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            stop_after_test: true,
            environments: Vec::new(),
            test_configurations: Vec::new(),
            catalog: Catalog::default(),
            variables: BTreeMap::new(),
            logging_blocks: Vec::new(),
            symbol_mappings: Vec::new(),
        }
    }
}

/// Files the model can "load", keyed by path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSpec>,
    #[serde(default)]
    pub units: BTreeMap<String, UnitSpec>,
    /// Diagnostic text returned when a mapping file is appended
    #[serde(default)]
    pub symbol_diagnostics: BTreeMap<String, String>,
}

impl Catalog {
    /// Look up by exact path first, then by file name
    fn find<'a, T>(entries: &'a BTreeMap<String, T>, path: &Path) -> Option<&'a T> {
        let key = path.to_string_lossy();
        if let Some(entry) = entries.get(key.as_ref()) {
            return Some(entry);
        }
        let file_name = path.file_name()?;
        entries
            .iter()
            .find(|(k, _)| Path::new(k.as_str()).file_name() == Some(file_name))
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub report: ReportSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSpec {
    pub name: String,
    #[serde(default)]
    pub start_on_sys_var: String,
    #[serde(default)]
    pub ignore_break_on_fail: bool,
    #[serde(default = "default_true")]
    pub use_joint_report: bool,
    #[serde(default)]
    pub units: Vec<UnitSpec>,
    #[serde(default)]
    pub variant_profiles: Vec<PathBuf>,
}

impl ConfigurationSpec {
    pub fn new(name: &str, units: Vec<UnitSpec>) -> Self {
        Self {
            name: name.to_string(),
            start_on_sys_var: String::new(),
            ignore_break_on_fail: false,
            use_joint_report: true,
            units,
            variant_profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub report: ReportSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub full_path: String,
}

/// A test tree node; leaves may carry the verdict a run produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub caption: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VariableValue>,
}

impl ElementSpec {
    pub fn leaf(caption: &str) -> Self {
        Self {
            caption: caption.to_string(),
            ..Self::default()
        }
    }

    pub fn group(caption: &str, children: Vec<ElementSpec>) -> Self {
        Self {
            caption: caption.to_string(),
            children,
            ..Self::default()
        }
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn with_verdict(mut self, verdict: impl Into<VariableValue>) -> Self {
        self.verdict = Some(verdict.into());
        self
    }
}

impl Snapshot {
    /// Read a snapshot from a YAML or TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let snapshot: Snapshot = if paths::has_extension(path, "toml") {
            toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))?
        };

        tracing::debug!(path = %path.display(), name = %snapshot.name, "Loaded tool snapshot");
        Ok(snapshot)
    }
}

// === Runtime state ===

#[derive(Debug)]
struct Node {
    caption: String,
    enabled: bool,
    verdict: Option<VariableValue>,
    children: Vec<Shared<Node>>,
}

impl Node {
    fn build(spec: &ElementSpec) -> Shared<Node> {
        shared(Node {
            caption: spec.caption.clone(),
            enabled: spec.enabled,
            verdict: spec.verdict.clone(),
            children: spec.children.iter().map(Node::build).collect(),
        })
    }

    fn spec(node: &Shared<Node>) -> ElementSpec {
        let node = node.borrow();
        ElementSpec {
            caption: node.caption.clone(),
            enabled: node.enabled,
            children: node.children.iter().map(Node::spec).collect(),
            verdict: node.verdict.clone(),
        }
    }

    /// Verdicts of enabled leaves, in tree order
    fn enabled_verdicts(node: &Shared<Node>, out: &mut Vec<VariableValue>) {
        let node = node.borrow();
        if node.children.is_empty() {
            if node.enabled {
                out.extend(node.verdict.clone());
            }
        } else {
            for child in &node.children {
                Node::enabled_verdicts(child, out);
            }
        }
    }
}

#[derive(Debug)]
struct ModuleState {
    name: String,
    elements: Vec<Shared<Node>>,
    report: Shared<ReportSpec>,
    starts: usize,
}

#[derive(Debug)]
struct EnvironmentState {
    name: String,
    modules: Vec<Shared<ModuleState>>,
}

impl EnvironmentState {
    fn build(spec: &EnvironmentSpec) -> Shared<Self> {
        shared(Self {
            name: spec.name.clone(),
            modules: spec
                .modules
                .iter()
                .map(|m| {
                    shared(ModuleState {
                        name: m.name.clone(),
                        elements: m.elements.iter().map(Node::build).collect(),
                        report: shared(m.report.clone()),
                        starts: 0,
                    })
                })
                .collect(),
        })
    }

    fn spec(&self) -> EnvironmentSpec {
        EnvironmentSpec {
            name: self.name.clone(),
            modules: self
                .modules
                .iter()
                .map(|m| {
                    let m = m.borrow();
                    let report = m.report.borrow().clone();
                    ModuleSpec {
                        name: m.name.clone(),
                        elements: m.elements.iter().map(Node::spec).collect(),
                        report,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
struct UnitState {
    name: String,
    elements: Vec<Shared<Node>>,
    report: Shared<ReportSpec>,
    starts: usize,
}

impl UnitState {
    fn build(spec: &UnitSpec) -> Shared<Self> {
        shared(Self {
            name: spec.name.clone(),
            elements: spec.elements.iter().map(Node::build).collect(),
            report: shared(spec.report.clone()),
            starts: 0,
        })
    }

    fn spec(&self) -> UnitSpec {
        UnitSpec {
            name: self.name.clone(),
            elements: self.elements.iter().map(Node::spec).collect(),
            report: self.report.borrow().clone(),
        }
    }
}

#[derive(Debug)]
struct ConfigurationState {
    name: String,
    start_on_sys_var: String,
    ignore_break_on_fail: bool,
    use_joint_report: bool,
    units: Vec<Shared<UnitState>>,
    variant_profiles: Vec<PathBuf>,
}

impl ConfigurationState {
    fn build(spec: &ConfigurationSpec) -> Shared<Self> {
        shared(Self {
            name: spec.name.clone(),
            start_on_sys_var: spec.start_on_sys_var.clone(),
            ignore_break_on_fail: spec.ignore_break_on_fail,
            use_joint_report: spec.use_joint_report,
            units: spec.units.iter().map(UnitState::build).collect(),
            variant_profiles: spec.variant_profiles.clone(),
        })
    }

    fn spec(&self) -> ConfigurationSpec {
        ConfigurationSpec {
            name: self.name.clone(),
            start_on_sys_var: self.start_on_sys_var.clone(),
            ignore_break_on_fail: self.ignore_break_on_fail,
            use_joint_report: self.use_joint_report,
            units: self.units.iter().map(|u| u.borrow().spec()).collect(),
            variant_profiles: self.variant_profiles.clone(),
        }
    }
}

#[derive(Debug)]
struct ToolState {
    name: String,
    source: Option<PathBuf>,
    stop_after_test: bool,
    visible: bool,
    running: bool,
    environments: Vec<Shared<EnvironmentState>>,
    configurations: Vec<Shared<ConfigurationState>>,
    catalog: Catalog,
    variables: BTreeMap<String, BTreeMap<String, VariableValue>>,
    logging_blocks: Vec<String>,
    symbol_mappings: Vec<PathBuf>,
    /// Structural calls made against the model, in order
    calls: Vec<String>,
}

impl ToolState {
    fn record(&mut self, call: impl Into<String>) {
        let call = call.into();
        tracing::trace!(call = %call, "memory tool call");
        self.calls.push(call);
    }
}

fn item<T: Clone>(items: &[T], index: usize, what: &str) -> Result<T> {
    items.get(index).cloned().ok_or_else(|| {
        Error::remote(
            what,
            format!("index {} out of range ({} items)", index, items.len()),
        )
    })
}

// === Root ===

/// Handle onto an in-memory tool; clones share the same state
#[derive(Debug, Clone)]
pub struct MemoryTool {
    state: Shared<ToolState>,
}

impl MemoryTool {
    pub fn new(snapshot: Snapshot) -> Self {
        let state = ToolState {
            name: snapshot.name,
            source: None,
            stop_after_test: snapshot.stop_after_test,
            visible: true,
            running: false,
            environments: snapshot.environments.iter().map(EnvironmentState::build).collect(),
            configurations: snapshot
                .test_configurations
                .iter()
                .map(ConfigurationState::build)
                .collect(),
            catalog: snapshot.catalog,
            variables: snapshot.variables,
            logging_blocks: snapshot.logging_blocks,
            symbol_mappings: snapshot.symbol_mappings,
            calls: Vec::new(),
        };
        Self {
            state: shared(state),
        }
    }

    /// Load a snapshot file; `save` writes the state back to it
    pub fn load(path: &Path) -> Result<Self> {
        let tool = Self::new(Snapshot::load(path)?);
        tool.state.borrow_mut().source = Some(path.to_path_buf());
        Ok(tool)
    }

    /// Current state as a snapshot
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.borrow();
        Snapshot {
            name: state.name.clone(),
            stop_after_test: state.stop_after_test,
            environments: state.environments.iter().map(|e| e.borrow().spec()).collect(),
            test_configurations: state
                .configurations
                .iter()
                .map(|c| c.borrow().spec())
                .collect(),
            catalog: state.catalog.clone(),
            variables: state.variables.clone(),
            logging_blocks: state.logging_blocks.clone(),
            symbol_mappings: state.symbol_mappings.clone(),
        }
    }

    /// Structural calls made so far (adds, removes, starts, saves, ...)
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    /// `(caption, enabled)` of every leaf of the first unit of the first
    /// test configuration, in tree order
    pub fn unit_leaves(&self) -> Vec<(String, bool)> {
        let snapshot = self.snapshot();
        let mut leaves = Vec::new();
        if let Some(unit) = snapshot
            .test_configurations
            .first()
            .and_then(|c| c.units.first())
        {
            for element in &unit.elements {
                collect_leaves(element, &mut leaves);
            }
        }
        leaves
    }

    /// Number of times each unit of the first test configuration was started
    pub fn unit_starts(&self) -> usize {
        let state = self.state.borrow();
        state
            .configurations
            .first()
            .map(|c| c.borrow().units.iter().map(|u| u.borrow().starts).sum())
            .unwrap_or(0)
    }
}

fn collect_leaves(element: &ElementSpec, out: &mut Vec<(String, bool)>) {
    if element.children.is_empty() {
        out.push((element.caption.clone(), element.enabled));
    } else {
        for child in &element.children {
            collect_leaves(child, out);
        }
    }
}

impl Application for MemoryTool {
    fn open(&self, path: &Path) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.name = paths::stem(path);
        state.record(format!("open {}", path.display()));
        Ok(())
    }

    fn set_visible(&self, visible: bool) -> Result<()> {
        self.state.borrow_mut().visible = visible;
        Ok(())
    }

    fn quit(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.running = false;
        state.record("quit");
        Ok(())
    }

    fn configuration(&self) -> Result<Box<dyn Configuration>> {
        Ok(Box::new(MemoryConfiguration {
            tool: self.state.clone(),
        }))
    }

    fn measurement(&self) -> Result<Box<dyn Measurement>> {
        Ok(Box::new(MemoryMeasurement {
            tool: self.state.clone(),
        }))
    }

    fn variables(&self) -> Result<Box<dyn VariableStore>> {
        Ok(Box::new(MemoryVariables {
            tool: self.state.clone(),
        }))
    }
}

struct MemoryMeasurement {
    tool: Shared<ToolState>,
}

impl Measurement for MemoryMeasurement {
    fn start(&self) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        tool.running = true;
        tool.record("start_measurement");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        tool.running = false;
        tool.record("stop_measurement");
        Ok(())
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.tool.borrow().running)
    }
}

struct MemoryVariables {
    tool: Shared<ToolState>,
}

impl VariableStore for MemoryVariables {
    fn get(&self, namespace: &str, name: &str) -> Result<VariableValue> {
        self.tool
            .borrow()
            .variables
            .get(namespace)
            .and_then(|vars| vars.get(name))
            .cloned()
            .ok_or_else(|| {
                Error::remote("Variables.get", format!("no variable {}::{}", namespace, name))
            })
    }

    fn set(&self, namespace: &str, name: &str, value: VariableValue) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        let vars = tool.variables.get_mut(namespace).ok_or_else(|| {
            Error::remote("Variables.set", format!("no namespace {}", namespace))
        })?;
        let slot = vars.get_mut(name).ok_or_else(|| {
            Error::remote("Variables.set", format!("no variable {}::{}", namespace, name))
        })?;
        *slot = value;
        Ok(())
    }
}

// === Configuration ===

struct MemoryConfiguration {
    tool: Shared<ToolState>,
}

impl Configuration for MemoryConfiguration {
    fn name(&self) -> Result<String> {
        Ok(self.tool.borrow().name.clone())
    }

    fn save(&self) -> Result<()> {
        self.tool.borrow_mut().record("save");
        let source = self.tool.borrow().source.clone();
        let Some(path) = source else {
            return Ok(());
        };

        let snapshot = MemoryTool {
            state: self.tool.clone(),
        }
        .snapshot();
        let content = if paths::has_extension(&path, "toml") {
            toml::to_string_pretty(&snapshot).map_err(|e| Error::Config(e.to_string()))?
        } else {
            serde_yaml::to_string(&snapshot).map_err(|e| Error::Config(e.to_string()))?
        };
        std::fs::write(&path, content)?;
        tracing::debug!(path = %path.display(), "Saved tool snapshot");
        Ok(())
    }

    fn test_environments(&self) -> Result<Box<dyn TestEnvironments>> {
        Ok(Box::new(MemoryEnvironments {
            tool: self.tool.clone(),
        }))
    }

    fn test_configurations(&self) -> Result<Box<dyn TestConfigurations>> {
        Ok(Box::new(MemoryTestConfigurations {
            tool: self.tool.clone(),
        }))
    }

    fn symbol_mappings(&self) -> Result<Box<dyn SymbolMappings>> {
        Ok(Box::new(MemorySymbolMappings {
            tool: self.tool.clone(),
        }))
    }

    fn logging_blocks(&self) -> Result<Box<dyn LoggingBlocks>> {
        Ok(Box::new(MemoryLoggingBlocks {
            tool: self.tool.clone(),
        }))
    }
}

// === Test environments ===

struct MemoryEnvironments {
    tool: Shared<ToolState>,
}

impl TestEnvironments for MemoryEnvironments {
    fn count(&self) -> Result<usize> {
        Ok(self.tool.borrow().environments.len())
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestEnvironment>> {
        let env = item(&self.tool.borrow().environments, index, "TestEnvironments.item")?;
        Ok(Box::new(MemoryEnvironment { env }))
    }

    fn add(&self, path: &Path) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        let spec = Catalog::find(&tool.catalog.environments, path)
            .cloned()
            .ok_or_else(|| {
                Error::remote(
                    "TestEnvironments.add",
                    format!("cannot open '{}'", path.display()),
                )
            })?;
        tool.environments.push(EnvironmentState::build(&spec));
        tool.record(format!("add_environment {}", path.display()));
        Ok(())
    }

    fn remove(&self, index: usize) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        item(&tool.environments, index, "TestEnvironments.remove")?;
        tool.environments.remove(index);
        tool.record(format!("remove_environment {}", index));
        Ok(())
    }
}

struct MemoryEnvironment {
    env: Shared<EnvironmentState>,
}

impl TestEnvironment for MemoryEnvironment {
    fn name(&self) -> Result<String> {
        Ok(self.env.borrow().name.clone())
    }

    fn module_count(&self) -> Result<usize> {
        Ok(self.env.borrow().modules.len())
    }

    fn module(&self, index: usize) -> Result<Box<dyn TestModule>> {
        let module = item(&self.env.borrow().modules, index, "TestModules.item")?;
        Ok(Box::new(MemoryModule { module }))
    }
}

struct MemoryModule {
    module: Shared<ModuleState>,
}

impl TestModule for MemoryModule {
    fn name(&self) -> Result<String> {
        Ok(self.module.borrow().name.clone())
    }

    fn elements(&self) -> Result<Vec<ElementRef>> {
        Ok(wrap_nodes(&self.module.borrow().elements))
    }

    fn report(&self) -> Result<Box<dyn Report>> {
        Ok(Box::new(MemoryReport {
            report: self.module.borrow().report.clone(),
        }))
    }

    fn start(&self) -> Result<()> {
        self.module.borrow_mut().starts += 1;
        Ok(())
    }
}

// === Test configurations ===

struct MemoryTestConfigurations {
    tool: Shared<ToolState>,
}

impl TestConfigurations for MemoryTestConfigurations {
    fn count(&self) -> Result<usize> {
        Ok(self.tool.borrow().configurations.len())
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestConfiguration>> {
        let config = item(&self.tool.borrow().configurations, index, "TestConfigurations.item")?;
        Ok(Box::new(MemoryTestConfiguration {
            tool: self.tool.clone(),
            config,
        }))
    }

    fn add(&self) -> Result<Box<dyn TestConfiguration>> {
        let mut tool = self.tool.borrow_mut();
        let name = format!("Test_Configuration_{}", tool.configurations.len() + 1);
        let config = ConfigurationState::build(&ConfigurationSpec::new(&name, Vec::new()));
        tool.configurations.push(config.clone());
        tool.variables.entry(name).or_default();
        tool.record("add_configuration");
        Ok(Box::new(MemoryTestConfiguration {
            tool: self.tool.clone(),
            config,
        }))
    }

    fn remove(&self, index: usize) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        item(&tool.configurations, index, "TestConfigurations.remove")?;
        tool.configurations.remove(index);
        tool.record(format!("remove_configuration {}", index));
        Ok(())
    }
}

struct MemoryTestConfiguration {
    tool: Shared<ToolState>,
    config: Shared<ConfigurationState>,
}

impl TestConfiguration for MemoryTestConfiguration {
    fn name(&self) -> Result<String> {
        Ok(self.config.borrow().name.clone())
    }

    fn settings(&self) -> Result<Box<dyn TestConfigurationSettings>> {
        Ok(Box::new(MemorySettings {
            config: self.config.clone(),
        }))
    }

    fn report(&self) -> Result<Box<dyn ConfigurationReport>> {
        Ok(Box::new(MemorySettings {
            config: self.config.clone(),
        }))
    }

    fn units(&self) -> Result<Box<dyn TestUnits>> {
        Ok(Box::new(MemoryUnits {
            tool: self.tool.clone(),
            config: self.config.clone(),
        }))
    }

    fn import_variant_profiles(&self, path: &Path) -> Result<()> {
        self.config.borrow_mut().variant_profiles.push(path.to_path_buf());
        self.tool
            .borrow_mut()
            .record(format!("import_variant_profiles {}", path.display()));
        Ok(())
    }
}

/// Settings and report of a test configuration share its state
struct MemorySettings {
    config: Shared<ConfigurationState>,
}

impl TestConfigurationSettings for MemorySettings {
    fn start_on_sys_var(&self) -> Result<String> {
        Ok(self.config.borrow().start_on_sys_var.clone())
    }

    fn set_start_on_sys_var(&self, variable: &str) -> Result<()> {
        self.config.borrow_mut().start_on_sys_var = variable.to_string();
        Ok(())
    }

    fn ignore_break_on_fail(&self) -> Result<bool> {
        Ok(self.config.borrow().ignore_break_on_fail)
    }

    fn set_ignore_break_on_fail(&self, ignore: bool) -> Result<()> {
        self.config.borrow_mut().ignore_break_on_fail = ignore;
        Ok(())
    }
}

impl ConfigurationReport for MemorySettings {
    fn use_joint_report(&self) -> Result<bool> {
        Ok(self.config.borrow().use_joint_report)
    }

    fn set_use_joint_report(&self, joint: bool) -> Result<()> {
        self.config.borrow_mut().use_joint_report = joint;
        Ok(())
    }
}

struct MemoryUnits {
    tool: Shared<ToolState>,
    config: Shared<ConfigurationState>,
}

impl TestUnits for MemoryUnits {
    fn count(&self) -> Result<usize> {
        Ok(self.config.borrow().units.len())
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestUnit>> {
        let unit = item(&self.config.borrow().units, index, "TestUnits.item")?;
        Ok(Box::new(MemoryUnit {
            tool: self.tool.clone(),
            config: self.config.clone(),
            unit,
        }))
    }

    fn add(&self, path: &Path) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        let spec = Catalog::find(&tool.catalog.units, path).cloned().ok_or_else(|| {
            Error::remote("TestUnits.add", format!("cannot open '{}'", path.display()))
        })?;
        self.config.borrow_mut().units.push(UnitState::build(&spec));
        tool.record(format!("add_unit {}", path.display()));
        Ok(())
    }
}

struct MemoryUnit {
    tool: Shared<ToolState>,
    config: Shared<ConfigurationState>,
    unit: Shared<UnitState>,
}

impl TestUnit for MemoryUnit {
    fn name(&self) -> Result<String> {
        Ok(self.unit.borrow().name.clone())
    }

    fn elements(&self) -> Result<Vec<ElementRef>> {
        Ok(wrap_nodes(&self.unit.borrow().elements))
    }

    fn report(&self) -> Result<Box<dyn Report>> {
        Ok(Box::new(MemoryReport {
            report: self.unit.borrow().report.clone(),
        }))
    }

    /// Runs to completion immediately: the enabled leaf's verdict is
    /// published under the configuration's namespace
    fn start(&self) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        if !tool.running {
            return Err(Error::remote("TestUnit.start", "measurement is not running"));
        }

        let mut unit = self.unit.borrow_mut();
        unit.starts += 1;
        let mut verdicts = Vec::new();
        for node in &unit.elements {
            Node::enabled_verdicts(node, &mut verdicts);
        }

        if let Some(verdict) = verdicts.pop() {
            let namespace = self.config.borrow().name.clone();
            tool.variables
                .entry(namespace)
                .or_default()
                .insert(VERDICT_VARIABLE.to_string(), verdict);
        }
        if tool.stop_after_test {
            tool.running = false;
        }
        tool.record(format!("start_unit {}", unit.name));
        Ok(())
    }
}

struct MemoryReport {
    report: Shared<ReportSpec>,
}

impl Report for MemoryReport {
    fn is_enabled(&self) -> Result<bool> {
        Ok(self.report.borrow().enabled)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.report.borrow_mut().enabled = enabled;
        Ok(())
    }

    fn full_path(&self) -> Result<String> {
        Ok(self.report.borrow().full_path.clone())
    }

    fn set_full_path(&self, path: &str) -> Result<()> {
        self.report.borrow_mut().full_path = path.to_string();
        Ok(())
    }
}

// === Elements ===

fn wrap_nodes(nodes: &[Shared<Node>]) -> Vec<ElementRef> {
    nodes
        .iter()
        .map(|node| Box::new(MemoryElement { node: node.clone() }) as ElementRef)
        .collect()
}

struct MemoryElement {
    node: Shared<Node>,
}

impl TestElement for MemoryElement {
    fn caption(&self) -> Result<String> {
        Ok(self.node.borrow().caption.clone())
    }

    fn children(&self) -> Result<Vec<ElementRef>> {
        Ok(wrap_nodes(&self.node.borrow().children))
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.node.borrow().enabled)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.node.borrow_mut().enabled = enabled;
        Ok(())
    }
}

// === Online setup ===

struct MemorySymbolMappings {
    tool: Shared<ToolState>,
}

impl SymbolMappings for MemorySymbolMappings {
    fn clear(&self) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        tool.symbol_mappings.clear();
        tool.record("clear_symbol_mappings");
        Ok(())
    }

    fn append(&self, path: &Path) -> Result<String> {
        let mut tool = self.tool.borrow_mut();
        let diagnostic = Catalog::find(&tool.catalog.symbol_diagnostics, path)
            .cloned()
            .unwrap_or_default();
        if diagnostic.is_empty() {
            tool.symbol_mappings.push(path.to_path_buf());
        }
        tool.record(format!("append_symbol_mappings {}", path.display()));
        Ok(diagnostic)
    }
}

struct MemoryLoggingBlocks {
    tool: Shared<ToolState>,
}

impl LoggingBlocks for MemoryLoggingBlocks {
    fn count(&self) -> Result<usize> {
        Ok(self.tool.borrow().logging_blocks.len())
    }

    fn full_name(&self, index: usize) -> Result<String> {
        item(&self.tool.borrow().logging_blocks, index, "LoggingCollection.item")
    }

    fn set_full_name(&self, index: usize, name: &str) -> Result<()> {
        let mut tool = self.tool.borrow_mut();
        item(&tool.logging_blocks, index, "LoggingCollection.item")?;
        tool.logging_blocks[index] = name.to_string();
        tool.record(format!("set_logging {} {}", index, name));
        Ok(())
    }
}
