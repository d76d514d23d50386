//! Backend selection
//!
//! Connects to the live tool through the bridge process, or to the
//! in-memory model when a snapshot is given.

use std::path::Path;

use crate::bridge::BridgeClient;
use crate::common::config::Config;
use crate::common::Result;
use crate::remote::memory::MemoryTool;
use crate::remote::Application;

/// Connect to the tool and apply the application settings
pub fn connect(simulate: Option<&Path>, config: &Config) -> Result<Box<dyn Application>> {
    let app = match simulate {
        Some(snapshot) => simulator(snapshot)?,
        None => bridge(config)?,
    };
    apply_settings(app, config)
}

/// Apply the `[application]` settings to a freshly connected tool
pub fn apply_settings(app: Box<dyn Application>, config: &Config) -> Result<Box<dyn Application>> {
    app.set_visible(config.application.visible)?;
    Ok(app)
}

/// In-memory tool backed by a snapshot file; saving writes the file back
pub fn simulator(snapshot: &Path) -> Result<Box<dyn Application>> {
    let tool = MemoryTool::load(snapshot)?;
    tracing::debug!(snapshot = %snapshot.display(), "Simulating tool");
    Ok(Box::new(tool))
}

/// Live tool behind the configured bridge executable
pub fn bridge(config: &Config) -> Result<Box<dyn Application>> {
    let path = config.bridge_path()?;
    let client = BridgeClient::spawn(&path, &config.bridge.args)?;
    Ok(client.into_application())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::remote::memory::Snapshot;
    use std::io::Write;

    #[test]
    fn test_settings_hide_the_tool() {
        let tool = MemoryTool::new(Snapshot::default());
        assert!(tool.is_visible());

        let config = Config::parse("[application]\nvisible = false\n").unwrap();
        let app = apply_settings(Box::new(tool.clone()), &config).unwrap();
        assert!(!tool.is_visible());

        let config = Config::default();
        apply_settings(app, &config).unwrap();
        assert!(tool.is_visible());
    }

    #[test]
    fn test_simulator_loads_snapshot() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: bench").unwrap();

        let config = Config::parse("[application]\nvisible = false\n").unwrap();
        let app = connect(Some(file.path()), &config).unwrap();
        assert_eq!(app.configuration().unwrap().name().unwrap(), "bench");
    }

    #[test]
    fn test_missing_snapshot() {
        let config = Config::default();
        let result = connect(Some(Path::new("/nonexistent/bench.yaml")), &config);
        assert!(matches!(result, Err(Error::FileRead { .. })));
    }

    #[test]
    fn test_bridge_spawn_failure() {
        let config = Config::parse("[bridge]\npath = \"/nonexistent/canoe-bridge\"\n").unwrap();
        assert!(matches!(bridge(&config), Err(Error::BridgeStartFailed(_))));
    }
}
