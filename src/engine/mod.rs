//! Test-tree traversal and invariant enforcement
//!
//! The session binds to the remote tool's test setup after the gate has
//! checked its cardinalities, the walker enumerates or mutates the leaves of
//! the bound unit, and the run controller executes against the binding.

mod control;
pub mod gate;
mod session;
pub mod walker;

pub use gate::{ConfigurationBinding, EnvironmentBinding};
pub use session::{
    Session, SessionState, CONFIGURATION_EXTENSION, ENVIRONMENT_EXTENSION, TEST_UNIT_EXTENSION,
};
pub use walker::{CaptionVisitor, SelectionVisitor, Traversal, Visitor};
