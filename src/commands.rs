//! CLI command definitions
//!
//! Defines the clap commands for the canoe CLI. Each invocation is its own
//! session against the tool; commands that change the test setup save the
//! configuration before returning so the next invocation sees the change.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Open a configuration, run the measurement for a while, save and quit
    Run {
        /// Configuration file (.cfg)
        configuration: PathBuf,

        /// Seconds to keep the measurement running (default from config)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Open a configuration file in the tool
    Open {
        /// Configuration file (.cfg)
        configuration: PathBuf,
    },

    /// Load a test environment and select its power variant
    #[command(name = "load-env")]
    LoadEnv {
        /// Test environment file (.tse)
        environment: PathBuf,

        /// Select the PowerOff variant instead of PowerOn
        #[arg(long)]
        power_off: bool,
    },

    /// Replace the test configurations with one holding a single test unit
    #[command(name = "load-unit")]
    LoadUnit {
        /// Test unit file (.vtuexe)
        unit: PathBuf,

        /// Start the test configuration when this system variable is set
        #[arg(long)]
        trigger: Option<String>,

        /// Variant profile to import into the new test configuration
        #[arg(long)]
        variant: Option<PathBuf>,
    },

    /// List the test cases of the bound test unit
    #[command(alias = "ls")]
    List,

    /// Enable exactly one test case, disabling every other
    Enable {
        /// Test case caption
        test_case: String,
    },

    /// Enable a test case, run it and report the verdict
    Execute {
        /// Test case caption
        test_case: String,

        /// Write the test unit report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Seconds to wait for the test to finish (default from config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Return after starting, without waiting for the verdict
        #[arg(long)]
        no_wait: bool,
    },

    /// Read the verdict summary of a test configuration
    Verdict {
        /// Test configuration name (default from config)
        #[arg(long)]
        configuration: Option<String>,
    },

    /// Replace the symbol mappings with the given file
    Mappings {
        /// Symbol mapping file
        file: PathBuf,
    },

    /// Point the single logging block at a new file name
    Logging {
        /// Logging block full name
        name: String,
    },

    /// Show the bound environment and test configuration
    Status,

    /// Execute a test scenario defined in a YAML file
    Test {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },
}
