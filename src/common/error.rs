//! Error types for the canoe CLI
//!
//! Every error is raised synchronously to the immediate caller. Nothing here
//! is retried: the remote tool is either present and consistent, or it is the
//! caller's job to reopen or reconfigure it before trying again.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the canoe CLI
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Not connected to the automation interface. Connect a backend before running session operations")]
    NotConnected,

    #[error("Remote call '{operation}' failed: {message}")]
    Remote { operation: String, message: String },

    // === Precondition Errors ===
    #[error("'{path}' is not a {expected} file (expected extension '{extension}')")]
    Format {
        path: String,
        expected: String,
        extension: String,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Unexpected test structure: {0}")]
    Structure(String),

    #[error("No elements in test unit")]
    EmptyTree,

    #[error("No test case named '{0}' was enabled")]
    NoSelection(String),

    #[error("Test case name '{name}' matched {count} test cases; captions must be unique")]
    AmbiguousSelection { name: String, count: usize },

    #[error("Cannot {action} while session is {state}")]
    InvalidState { action: String, state: String },

    #[error("Symbol mapping '{path}' rejected: {message}")]
    SymbolMapping { path: String, message: String },

    // === Bridge Errors ===
    #[error("Automation bridge '{name}' not found. Searched: {searched}")]
    BridgeNotFound { name: String, searched: String },

    #[error("Automation bridge failed to start: {0}")]
    BridgeStartFailed(String),

    #[error("Automation bridge exited unexpectedly")]
    BridgeClosed,

    #[error("Bridge protocol error: {0}")]
    BridgeProtocol(String),

    // === Timeout Errors ===
    #[error("Measurement still running after {0:?}")]
    Timeout(Duration),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),
}

impl Error {
    /// Create a format error for a path that lacks the expected extension
    pub fn format(path: &str, expected: &str, extension: &str) -> Self {
        Self::Format {
            path: path.to_string(),
            expected: expected.to_string(),
            extension: extension.to_string(),
        }
    }

    /// Create an invariant error
    pub fn invariant(message: &str) -> Self {
        Self::Invariant(message.to_string())
    }

    /// Create a remote call failure
    pub fn remote(operation: &str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a bridge not found error with search paths
    pub fn bridge_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::BridgeNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Stable machine-readable code, used for `--json` output
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotConnected => "NOT_CONNECTED",
            Error::Remote { .. } => "REMOTE_ERROR",
            Error::Format { .. } => "FORMAT",
            Error::Invariant(_) => "INVARIANT",
            Error::Structure(_) => "STRUCTURE",
            Error::EmptyTree => "EMPTY_TREE",
            Error::NoSelection(_) => "NO_SELECTION",
            Error::AmbiguousSelection { .. } => "AMBIGUOUS_SELECTION",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::SymbolMapping { .. } => "SYMBOL_MAPPING",
            Error::BridgeNotFound { .. }
            | Error::BridgeStartFailed(_)
            | Error::BridgeClosed
            | Error::BridgeProtocol(_) => "BRIDGE_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::TestAssertion(_) => "TEST_ASSERTION",
            _ => "INTERNAL_ERROR",
        }
    }
}
