//! Run control
//!
//! Measurement start/stop and test execution on top of a bound session.
//! Starting a test returns immediately; waiting for it and reading the
//! verdict are separate calls.

use std::time::{Duration, Instant};

use crate::common::{Error, Result};
use crate::remote::{VariableValue, VERDICT_VARIABLE};

use super::session::Session;

impl Session {
    pub fn start_measurement(&mut self) -> Result<()> {
        self.application()?.measurement()?.start()?;
        tracing::info!("Measurement started");
        Ok(())
    }

    /// Stop the whole measurement; a single running test cannot be stopped
    pub fn stop_measurement(&mut self) -> Result<()> {
        self.application()?.measurement()?.stop()?;
        tracing::info!("Measurement stopped");
        Ok(())
    }

    pub fn is_running(&self) -> Result<bool> {
        self.application()?.measurement()?.is_running()
    }

    /// Start the bound test unit
    ///
    /// Requires a successful `enable_test_case` earlier in this session, and
    /// that test case must still be the only enabled one.
    pub fn run_test_unit(&mut self) -> Result<()> {
        let test_case = self.selected_test_case().unwrap_or_default().to_string();
        let binding = self.check_selection()?;
        binding.unit.start()?;
        tracing::info!(test_case = %test_case, "Test unit started");
        Ok(())
    }

    /// Start the bound test environment's test module
    pub fn run_test_module(&mut self) -> Result<()> {
        let binding = self.check_environment()?;
        let module = binding.module.name()?;
        binding.module.start()?;
        tracing::info!(module = %module, "Test module started");
        Ok(())
    }

    /// Verdict summary published by the test configuration `configuration`
    pub fn verdict(&self, configuration: &str) -> Result<VariableValue> {
        self.variable(configuration, VERDICT_VARIABLE)
    }

    pub fn variable(&self, namespace: &str, name: &str) -> Result<VariableValue> {
        self.application()?.variables()?.get(namespace, name)
    }

    pub fn set_variable(&self, namespace: &str, name: &str, value: VariableValue) -> Result<()> {
        self.application()?.variables()?.set(namespace, name, value)
    }

    /// Poll until the measurement stops, returning how long that took
    pub fn wait_until_stopped(&self, timeout: Duration, poll: Duration) -> Result<Duration> {
        let started = Instant::now();
        while self.is_running()? {
            if started.elapsed() >= timeout {
                return Err(Error::Timeout(timeout));
            }
            std::thread::sleep(poll);
        }
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::engine::SessionState;
    use crate::remote::memory::{ConfigurationSpec, ElementSpec, MemoryTool, Snapshot, UnitSpec};
    use crate::remote::Application;

    fn bench(stop_after_test: bool) -> (MemoryTool, Session) {
        let tool = MemoryTool::new(bench_snapshot(stop_after_test));
        let session = Session::with_application(Box::new(tool.clone()));
        (tool, session)
    }

    fn bench_snapshot(stop_after_test: bool) -> Snapshot {
        Snapshot {
            stop_after_test,
            test_configurations: vec![ConfigurationSpec::new(
                "Test_Configuration_1",
                vec![UnitSpec {
                    name: "body".to_string(),
                    elements: vec![
                        ElementSpec::leaf("Wakeup").with_verdict(1),
                        ElementSpec::leaf("Sleep").with_verdict(2),
                    ],
                    ..UnitSpec::default()
                }],
            )],
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_run_requires_selection() {
        let (tool, mut session) = bench(true);
        session.start_measurement().unwrap();
        let err = session.run_test_unit().unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(tool.unit_starts(), 0);

        assert!(session.enable_test_case("Missing").is_err());
        assert!(matches!(session.run_test_unit(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_run_and_read_verdict() {
        let (tool, mut session) = bench(true);
        session.enable_test_case("Sleep").unwrap();
        session.start_measurement().unwrap();
        assert!(session.is_running().unwrap());

        session.run_test_unit().unwrap();
        assert_eq!(tool.unit_starts(), 1);

        session
            .wait_until_stopped(Duration::from_secs(1), Duration::from_millis(1))
            .unwrap();
        assert_eq!(
            session.verdict("Test_Configuration_1").unwrap(),
            VariableValue::Integer(2)
        );
    }

    #[test]
    fn test_run_rejects_configuration_swapped_after_selection() {
        let mut snapshot = bench_snapshot(true);
        snapshot.catalog.units.insert(
            "other.vtuexe".to_string(),
            UnitSpec {
                name: "other".to_string(),
                elements: vec![
                    ElementSpec::leaf("X").enabled(),
                    ElementSpec::leaf("Y").enabled(),
                ],
                ..UnitSpec::default()
            },
        );
        let tool = MemoryTool::new(snapshot);
        let mut session = Session::with_application(Box::new(tool.clone()));
        session.enable_test_case("Wakeup").unwrap();

        // Replaced behind the session's back, still one configuration with one unit
        let configs = tool.configuration().unwrap().test_configurations().unwrap();
        configs.remove(0).unwrap();
        configs
            .add()
            .unwrap()
            .units()
            .unwrap()
            .add(Path::new("other.vtuexe"))
            .unwrap();

        session.start_measurement().unwrap();
        let err = session.run_test_unit().unwrap_err();
        assert!(matches!(err, Error::Invariant(ref m) if m.contains("X, Y")));
        assert_eq!(tool.unit_starts(), 0);
        assert_eq!(session.state(), SessionState::Unbound);
        assert_eq!(session.selected_test_case(), None);
    }

    #[test]
    fn test_run_rejects_selection_changed_in_place() {
        let (tool, mut session) = bench(true);
        session.enable_test_case("Wakeup").unwrap();

        let unit = tool
            .configuration()
            .unwrap()
            .test_configurations()
            .unwrap()
            .item(0)
            .unwrap()
            .units()
            .unwrap()
            .item(0)
            .unwrap();
        let elements = unit.elements().unwrap();
        elements[0].set_enabled(false).unwrap();
        elements[1].set_enabled(true).unwrap();

        session.start_measurement().unwrap();
        assert!(matches!(session.run_test_unit(), Err(Error::Invariant(_))));
        assert_eq!(tool.unit_starts(), 0);
        assert!(matches!(session.run_test_unit(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_wait_times_out() {
        let (_tool, mut session) = bench(false);
        session.start_measurement().unwrap();
        let err = session
            .wait_until_stopped(Duration::from_millis(20), Duration::from_millis(5))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(err.to_string(), "Measurement still running after 20ms");

        session.stop_measurement().unwrap();
        assert!(!session.is_running().unwrap());
    }

    #[test]
    fn test_not_connected() {
        let mut session = Session::new();
        assert!(matches!(session.start_measurement(), Err(Error::NotConnected)));
        assert!(matches!(session.verdict("x"), Err(Error::NotConnected)));
    }
}
