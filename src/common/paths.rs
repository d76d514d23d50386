//! Configuration and log file locations
//!
//! Uses the platform conventions provided by the `directories` crate:
//! - Linux: `~/.config/canoe-cli/`
//! - macOS: `~/Library/Application Support/canoe-cli/`
//! - Windows: `%APPDATA%\canoe-cli\`

use std::io;
use std::path::{Path, PathBuf};

/// Application name used for platform directories
const APP_NAME: &str = "canoe-cli";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Ensure the log directory exists
pub fn ensure_log_dir() -> io::Result<Option<PathBuf>> {
    if let Some(dir) = log_dir() {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Some(dir))
    } else {
        Ok(None)
    }
}

/// Check a path's extension against the expected one, case-sensitively
///
/// The remote tool only recognises the exact lowercase extensions, so
/// `suite.TSE` is rejected just like `suite.xml`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == extension)
        .unwrap_or(false)
}

/// File stem of a path as an owned string, empty when absent
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("C:/tests/suite.tse"), ".tse"));
        assert!(has_extension(Path::new("unit.vtuexe"), "vtuexe"));
        assert!(!has_extension(Path::new("unit.vtuexe.bak"), ".vtuexe"));
        assert!(!has_extension(Path::new("suite.TSE"), ".tse"));
        assert!(!has_extension(Path::new("tse"), ".tse"));
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem(Path::new("prj/singleCAN.cfg")), "singleCAN");
        assert_eq!(stem(Path::new("")), "");
    }
}
