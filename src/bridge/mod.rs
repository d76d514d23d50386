//! Automation bridge
//!
//! The live tool is only reachable through its platform automation
//! interface, so a small bridge process owns that connection and speaks a
//! Content-Length framed JSON protocol on stdio. This module holds the
//! codec, the message types, a client whose handles implement the remote
//! capability traits, and a server loop that can serve any
//! [`Application`](crate::remote::Application).

pub mod client;
pub mod codec;
pub mod protocol;
pub mod server;

pub use client::BridgeClient;
pub use server::serve;
