//! Mock automation bridge for integration testing
//!
//! Serves the bridge protocol on stdio from a snapshot file, so the bridge
//! client can be exercised across a real process boundary without the tool.
//!
//! Usage: `mock-bridge <snapshot.yaml>`

use std::io::BufReader;
use std::path::PathBuf;

use canoe::bridge;
use canoe::remote::memory::MemoryTool;

fn main() {
    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let Some(snapshot) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: mock-bridge <snapshot>");
        std::process::exit(2);
    };

    let tool = match MemoryTool::load(&snapshot) {
        Ok(tool) => tool,
        Err(e) => {
            eprintln!("mock-bridge: {}", e);
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    if let Err(e) = bridge::serve(&tool, &mut reader, &mut writer) {
        eprintln!("mock-bridge: {}", e);
        std::process::exit(1);
    }
}
