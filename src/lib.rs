//! canoe - automation of CANoe test setups
//!
//! This library drives the tool's test environments, test configurations
//! and test units through narrow capability traits, enforces the single
//! environment / single unit shape the workflow relies on, and selects
//! and runs individual test cases.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod remote;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{Session, SessionState};
