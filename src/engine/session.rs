//! Configuration session
//!
//! Owns the remote handle and the bindings validated by the gate. Every
//! operation re-validates before acting; a failed check drops all bindings
//! and returns the session to `unbound`.

use std::fmt;
use std::path::Path;

use crate::common::{paths, Error, Result};
use crate::remote::{Application, ElementRef, TestUnit};

use super::gate::{self, ConfigurationBinding, EnvironmentBinding};
use super::walker::{self, CaptionVisitor, EnabledVisitor, SelectionVisitor, Traversal};

pub const ENVIRONMENT_EXTENSION: &str = ".tse";
pub const TEST_UNIT_EXTENSION: &str = ".vtuexe";
pub const CONFIGURATION_EXTENSION: &str = ".cfg";

const POWER_ON: &str = "PowerOn";
const POWER_OFF: &str = "PowerOff";

/// Binding state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Nothing validated
    Unbound,
    /// Exactly one test environment found
    EnvironmentBound,
    /// Exactly one test configuration with exactly one unit found
    FullyBound,
    /// Exactly one test case enabled in the bound unit
    SelectableBound,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "unbound"),
            Self::EnvironmentBound => write!(f, "environment-bound"),
            Self::FullyBound => write!(f, "fully-bound"),
            Self::SelectableBound => write!(f, "selectable-bound"),
        }
    }
}

/// A session against one remote tool
pub struct Session {
    /// Remote root object; `None` until a backend is attached
    app: Option<Box<dyn Application>>,
    state: SessionState,
    /// Leaves enabled by the last selection pass
    enable_count: usize,
    /// Caption enabled by the last successful selection
    selected: Option<String>,
    environment: Option<EnvironmentBinding>,
    configuration: Option<ConfigurationBinding>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session with no remote attached
    pub fn new() -> Self {
        Self {
            app: None,
            state: SessionState::Unbound,
            enable_count: 0,
            selected: None,
            environment: None,
            configuration: None,
        }
    }

    /// Create a session attached to `app`
    pub fn with_application(app: Box<dyn Application>) -> Self {
        let mut session = Self::new();
        session.attach(app);
        session
    }

    /// Attach a remote, discarding any previous bindings
    pub fn attach(&mut self, app: Box<dyn Application>) {
        self.reset();
        self.app = Some(app);
    }

    /// Drop the remote handle and every binding
    pub fn detach(&mut self) -> Option<Box<dyn Application>> {
        self.reset();
        self.app.take()
    }

    pub fn is_connected(&self) -> bool {
        self.app.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn enable_count(&self) -> usize {
        self.enable_count
    }

    pub fn selected_test_case(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The remote root object
    pub fn application(&self) -> Result<&dyn Application> {
        self.app.as_deref().ok_or(Error::NotConnected)
    }

    fn reset(&mut self) {
        self.state = SessionState::Unbound;
        self.enable_count = 0;
        self.selected = None;
        self.environment = None;
        self.configuration = None;
    }

    fn advance(&mut self, state: SessionState) {
        self.state = self.state.max(state);
    }

    // === Invariant checks ===

    /// Validate and bind the single test environment
    pub fn check_environment(&mut self) -> Result<&EnvironmentBinding> {
        let result = gate::check_environment(self.application()?);
        match result {
            Ok(binding) => {
                self.advance(SessionState::EnvironmentBound);
                Ok(&*self.environment.insert(binding))
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Validate and bind the single test configuration and its unit
    ///
    /// A successful re-check keeps the current selection.
    pub fn check_configuration(&mut self) -> Result<&ConfigurationBinding> {
        let result = gate::check_configuration(self.application()?);
        match result {
            Ok(binding) => {
                self.advance(SessionState::FullyBound);
                Ok(&*self.configuration.insert(binding))
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// Re-validate the configuration and the selection made by
    /// `enable_test_case` against the unit as it is now
    ///
    /// The bound unit must have exactly one enabled leaf, captioned like the
    /// selected test case. Anything else resets the session.
    pub fn check_selection(&mut self) -> Result<&ConfigurationBinding> {
        let selected = match (&self.selected, self.state) {
            (Some(selected), SessionState::SelectableBound) => selected.clone(),
            _ => return Err(Error::invalid_state("run a test unit", self.state)),
        };

        let unit = &self.check_configuration()?.unit;
        let result = enabled_leaves(unit.as_ref()).and_then(|enabled| {
            if enabled.len() == 1 && enabled[0] == selected {
                Ok(())
            } else {
                Err(Error::invariant(&format!(
                    "expected only '{}' enabled, found [{}]",
                    selected,
                    enabled.join(", ")
                )))
            }
        });

        match result {
            Ok(()) => self.configuration.as_ref().ok_or(Error::NotConnected),
            Err(e) => {
                tracing::warn!(test_case = %selected, "Selection changed outside the session");
                self.reset();
                Err(e)
            }
        }
    }

    // === Tool configuration ===

    /// Open a `.cfg` configuration unless it is already the open one
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub fn open_configuration(&mut self, path: &Path) -> Result<()> {
        require_extension(path, CONFIGURATION_EXTENSION, "configuration")?;
        let app = self.application()?;

        let current = app.configuration()?.name()?;
        if current == paths::stem(path) {
            tracing::info!(configuration = %current, "Configuration already open");
            return Ok(());
        }

        app.open(path)?;
        tracing::info!("Opened configuration");
        self.reset();
        Ok(())
    }

    pub fn save_configuration(&mut self) -> Result<()> {
        self.application()?.configuration()?.save()?;
        tracing::info!("Saved configuration");
        Ok(())
    }

    /// Quit the remote tool; the session is detached afterwards
    pub fn quit(&mut self) -> Result<()> {
        self.application()?.quit()?;
        tracing::info!("Remote tool closed");
        self.detach();
        Ok(())
    }

    // === Test environments ===

    /// Load a `.tse` test environment and select its power-up variant
    ///
    /// An environment already present alone is reused as-is. Otherwise
    /// every present environment is removed, one at a time, before the new
    /// one is added.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub fn load_test_environment(&mut self, path: &Path, power_on: bool) -> Result<()> {
        require_extension(path, ENVIRONMENT_EXTENSION, "test environment")?;

        {
            let environments = self.application()?.configuration()?.test_environments()?;
            let count = environments.count()?;
            if count == 1 {
                tracing::info!("Reusing the test environment already loaded");
            } else {
                remove_all(
                    "test environment",
                    count,
                    || environments.count(),
                    |index| environments.remove(index),
                )?;
                environments.add(path)?;
                tracing::info!("Added test environment");
            }
        }

        let binding = self.check_environment()?;
        binding.module.report()?.set_enabled(false)?;
        select_power_variant(binding.module.elements()?, power_on)?;
        tracing::info!(power_on, "Test environment ready");
        Ok(())
    }

    /// Remove the single bound test environment
    pub fn remove_test_environment(&mut self) -> Result<()> {
        self.check_environment()?;
        self.application()?
            .configuration()?
            .test_environments()?
            .remove(0)?;
        self.environment = None;
        if self.state == SessionState::EnvironmentBound {
            self.state = SessionState::Unbound;
        }
        tracing::info!("Removed test environment");
        Ok(())
    }

    // === Test configurations ===

    /// Replace every test configuration by one holding the `.vtuexe` unit
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub fn load_test_configuration(&mut self, path: &Path) -> Result<()> {
        require_extension(path, TEST_UNIT_EXTENSION, "test unit")?;

        {
            let configurations = self.application()?.configuration()?.test_configurations()?;
            let count = configurations.count()?;
            remove_all(
                "test configuration",
                count,
                || configurations.count(),
                |index| configurations.remove(index),
            )?;

            let configuration = configurations.add()?;
            configuration.units()?.add(path)?;
            let name = configuration.name()?;
            tracing::info!(configuration = %name, "Added test unit");
        }

        self.reset();
        Ok(())
    }

    /// Enable exactly the leaf captioned `name`, disabling every other leaf
    #[tracing::instrument(skip(self))]
    pub fn enable_test_case(&mut self, name: &str) -> Result<()> {
        self.enable_count = 0;
        self.selected = None;
        if self.state == SessionState::SelectableBound {
            self.state = SessionState::FullyBound;
        }

        let binding = self.check_configuration()?;
        let selection = walker::traverse(binding.unit.as_ref(), SelectionVisitor::new(name))?
            .drain()?;
        self.enable_count = selection.matched();

        match self.enable_count {
            1 => {
                self.selected = Some(name.to_string());
                self.advance(SessionState::SelectableBound);
                tracing::info!("Test case enabled");
                Ok(())
            }
            0 => Err(Error::NoSelection(name.to_string())),
            count => Err(Error::AmbiguousSelection {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Captions of every test case in the bound unit, in tree order
    pub fn list_test_cases(&mut self) -> Result<Traversal<CaptionVisitor>> {
        let binding = self.check_configuration()?;
        walker::traverse(binding.unit.as_ref(), CaptionVisitor)
    }

    /// Write the unit report to `path` and enable it
    pub fn set_report_path(&mut self, path: &Path) -> Result<()> {
        let binding = self.check_configuration()?;
        binding
            .unit_report
            .set_full_path(&path.to_string_lossy())?;
        binding.unit_report.set_enabled(true)?;
        tracing::info!(path = %path.display(), "Test report enabled");
        Ok(())
    }

    /// Start the test configuration on `variable`, never break on a
    /// failure, and write one report per unit
    pub fn set_trigger_variable(&mut self, variable: &str) -> Result<()> {
        let binding = self.check_configuration()?;
        binding.settings.set_start_on_sys_var(variable)?;
        binding.settings.set_ignore_break_on_fail(true)?;
        binding.report.set_use_joint_report(false)?;
        tracing::info!(variable, "Start trigger set");
        Ok(())
    }

    pub fn import_variant_profile(&mut self, path: &Path) -> Result<()> {
        let binding = self.check_configuration()?;
        binding.configuration.import_variant_profiles(path)?;
        tracing::info!(path = %path.display(), "Variant profile import queued");
        Ok(())
    }

    // === Online setup ===

    /// Point the single logging block at `name`
    pub fn set_logging_target(&mut self, name: &str) -> Result<()> {
        let blocks = gate::check_logging(self.application()?)?;
        blocks.set_full_name(0, name)?;
        tracing::info!(target = name, "Logging target set");
        Ok(())
    }

    /// Replace all symbol mappings with the ones in `path`
    pub fn append_symbol_mappings(&mut self, path: &Path) -> Result<()> {
        let mappings = self.application()?.configuration()?.symbol_mappings()?;
        mappings.clear()?;
        let diagnostic = mappings.append(path)?;
        if !diagnostic.is_empty() {
            return Err(Error::SymbolMapping {
                path: path.display().to_string(),
                message: diagnostic,
            });
        }
        tracing::info!(path = %path.display(), "Symbol mappings loaded");
        Ok(())
    }
}

/// Captions of the enabled leaves of `unit`, in tree order
fn enabled_leaves(unit: &dyn TestUnit) -> Result<Vec<String>> {
    let mut traversal = walker::traverse(unit, EnabledVisitor::default())?;
    for leaf in traversal.by_ref() {
        leaf?;
    }
    Ok(traversal.into_visitor().captions().to_vec())
}

/// Reject `path` unless it carries `extension`; no remote call is made
fn require_extension(path: &Path, extension: &str, kind: &str) -> Result<()> {
    if paths::has_extension(path, extension) {
        Ok(())
    } else {
        Err(Error::format(&path.display().to_string(), kind, extension))
    }
}

/// Remove entries at index 0 until the collection is empty
///
/// Not transactional. A failure part-way leaves some entries removed and
/// the next cardinality check reports the count. A remote that does not
/// shrink after a removal is reported instead of looping forever.
fn remove_all(
    what: &str,
    mut count: usize,
    count_fn: impl Fn() -> Result<usize>,
    remove_fn: impl Fn(usize) -> Result<()>,
) -> Result<()> {
    while count > 0 {
        remove_fn(0)?;
        let remaining = count_fn()?;
        tracing::debug!(what, remaining, "Removed entry");
        if remaining >= count {
            return Err(Error::invariant(&format!(
                "{} count did not decrease after removal ({} left)",
                what, remaining
            )));
        }
        count = remaining;
    }
    Ok(())
}

/// Enable `PowerOn` or `PowerOff` inside the first top-level group
fn select_power_variant(elements: Vec<ElementRef>, power_on: bool) -> Result<()> {
    let group = elements
        .into_iter()
        .next()
        .ok_or_else(|| Error::Structure("test module has no elements".to_string()))?;
    let caption = group.caption()?;

    let children = group.children()?;
    if children.is_empty() {
        return Err(Error::Structure(format!(
            "first element '{}' is not a group",
            caption
        )));
    }

    let on = find_child(&children, &caption, POWER_ON)?;
    let off = find_child(&children, &caption, POWER_OFF)?;
    on.set_enabled(power_on)?;
    off.set_enabled(!power_on)?;
    Ok(())
}

fn find_child<'a>(children: &'a [ElementRef], group: &str, name: &str) -> Result<&'a ElementRef> {
    for child in children {
        if child.caption()? == name {
            return Ok(child);
        }
    }
    Err(Error::Structure(format!(
        "group '{}' has no '{}' element",
        group, name
    )))
}
