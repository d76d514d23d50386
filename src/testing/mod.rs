//! Scenario test runner
//!
//! Reads YAML test scenarios and runs them step by step against a session,
//! either on a simulated tool or through a bridge process, so assertions
//! are made against structured results.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_scenario, TestResult};
