//! canoe - command-line automation for CANoe test setups
//!
//! Loads test environments and test units into the open configuration,
//! selects a single test case, runs it and reports the verdict. The tool is
//! driven through an automation bridge process, or simulated from a
//! snapshot file with `--simulate`.

use std::path::PathBuf;

use clap::Parser;
use canoe::cli;
use canoe::commands::Commands;
use canoe::common::logging;

#[derive(Parser)]
#[command(name = "canoe", about = "CANoe test automation CLI")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Simulate the tool with a snapshot file (YAML or TOML)
    #[arg(long, global = true, value_name = "SNAPSHOT")]
    simulate: Option<PathBuf>,

    /// Open this configuration (.cfg) before running the command
    #[arg(long, global = true, value_name = "CONFIGURATION")]
    cfg: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write a debug log file
    #[arg(long, global = true)]
    log_file: bool,
}

fn main() {
    let cli = Cli::parse();

    let _guard = if cli.log_file {
        logging::init_file().map(|(path, guard)| {
            tracing::info!(path = %path.display(), "Writing log file");
            guard
        })
    } else {
        logging::init_cli();
        None
    };

    let options = cli::Options {
        simulate: cli.simulate,
        configuration: cli.cfg,
        json: cli.json,
    };

    if let Err(e) = cli::dispatch(cli.command, &options) {
        cli::print_error(&e, options.json);
        std::process::exit(1);
    }
}
