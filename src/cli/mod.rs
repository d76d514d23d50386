//! CLI command handling
//!
//! Runs each command as one session against the tool and formats output,
//! either as colored text or as JSON with `--json`.

pub mod connect;

use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use serde_json::{json, Value};

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::engine::Session;
use crate::remote::VariableValue;
use crate::testing;

/// Global options shared by every command
#[derive(Debug, Default)]
pub struct Options {
    /// Simulate the tool with this snapshot instead of using the bridge
    pub simulate: Option<PathBuf>,
    /// Configuration to open before the command runs
    pub configuration: Option<PathBuf>,
    /// Print results as JSON
    pub json: bool,
}

/// Dispatch a CLI command
pub fn dispatch(command: Commands, options: &Options) -> Result<()> {
    if let Commands::Test { path, verbose } = command {
        let result = testing::run_scenario(&path, verbose)?;
        if options.json {
            return print_json(&json!({
                "name": result.name,
                "passed": result.passed,
                "steps_run": result.steps_run,
                "steps_total": result.steps_total,
                "error": result.error,
            }));
        }
        return match result.error {
            None => Ok(()),
            Some(e) => Err(Error::TestAssertion(e)),
        };
    }

    let config = Config::load()?;
    let app = connect::connect(options.simulate.as_deref(), &config)?;
    let mut session = Session::with_application(app);

    if let Some(configuration) = &options.configuration {
        session.open_configuration(configuration)?;
    }

    execute(&mut session, command, &config, options.json)
}

fn execute(session: &mut Session, command: Commands, config: &Config, json: bool) -> Result<()> {
    match command {
        Commands::Run {
            configuration,
            seconds,
        } => {
            let seconds = seconds.unwrap_or(config.run.measurement_secs);

            session.open_configuration(&configuration)?;
            session.start_measurement()?;
            std::thread::sleep(Duration::from_secs(seconds));
            session.stop_measurement()?;
            session.save_configuration()?;
            session.quit()?;

            report(
                json,
                json!({ "configuration": configuration, "seconds": seconds }),
                || {
                    println!(
                        "Ran {} for {}s",
                        configuration.display().to_string().bold(),
                        seconds
                    )
                },
            )
        }

        Commands::Open { configuration } => {
            session.open_configuration(&configuration)?;
            let name = session.application()?.configuration()?.name()?;
            report(json, json!({ "configuration": name }), || {
                println!("Opened configuration {}", name.bold())
            })
        }

        Commands::LoadEnv {
            environment,
            power_off,
        } => {
            session.load_test_environment(&environment, !power_off)?;
            session.save_configuration()?;

            let variant = if power_off { "PowerOff" } else { "PowerOn" };
            report(
                json,
                json!({ "environment": environment, "variant": variant }),
                || {
                    println!(
                        "Loaded test environment {} ({})",
                        environment.display().to_string().bold(),
                        variant
                    )
                },
            )
        }

        Commands::LoadUnit {
            unit,
            trigger,
            variant,
        } => {
            session.load_test_configuration(&unit)?;
            if let Some(variable) = &trigger {
                session.set_trigger_variable(variable)?;
            }
            if let Some(profile) = &variant {
                session.import_variant_profile(profile)?;
            }
            session.save_configuration()?;

            report(
                json,
                json!({ "unit": unit, "trigger": trigger, "variant": variant }),
                || {
                    println!("Loaded test unit {}", unit.display().to_string().bold());
                    if let Some(variable) = &trigger {
                        println!("  Starts on {}", variable);
                    }
                    if let Some(profile) = &variant {
                        println!("  Variant profile {} queued", profile.display());
                    }
                },
            )
        }

        Commands::List => {
            let captions = session
                .list_test_cases()?
                .collect::<Result<Vec<String>>>()?;

            report(json, json!({ "test_cases": captions }), || {
                if captions.is_empty() {
                    println!("No test cases");
                } else {
                    println!("Test cases:");
                    for (i, caption) in captions.iter().enumerate() {
                        println!("  {:>3} {}", i + 1, caption);
                    }
                }
            })
        }

        Commands::Enable { test_case } => {
            session.enable_test_case(&test_case)?;
            session.save_configuration()?;
            report(json, json!({ "enabled": test_case }), || {
                println!("{} {}", "✓".green(), test_case)
            })
        }

        Commands::Execute {
            test_case,
            report: report_path,
            timeout,
            no_wait,
        } => {
            session.enable_test_case(&test_case)?;
            if let Some(path) = &report_path {
                session.set_report_path(path)?;
            }
            let configuration = session.check_configuration()?.configuration.name()?;

            session.start_measurement()?;
            session.run_test_unit()?;

            if no_wait {
                return report(json, json!({ "started": test_case }), || {
                    println!("Started {}", test_case.bold())
                });
            }

            let timeout =
                Duration::from_secs(timeout.unwrap_or(config.run.verdict_timeout_secs));
            let poll = Duration::from_millis(config.run.poll_interval_ms);
            let elapsed = session.wait_until_stopped(timeout, poll)?;
            let verdict = session.verdict(&configuration)?;

            report(
                json,
                json!({
                    "test_case": test_case,
                    "configuration": configuration,
                    "verdict": verdict,
                    "elapsed_ms": elapsed.as_millis() as u64,
                }),
                || {
                    println!(
                        "{} finished in {:.1}s, verdict {}",
                        test_case.bold(),
                        elapsed.as_secs_f64(),
                        format_verdict(&verdict)
                    )
                },
            )
        }

        Commands::Verdict { configuration } => {
            let configuration =
                configuration.unwrap_or_else(|| config.run.test_configuration.clone());
            let verdict = session.verdict(&configuration)?;
            report(
                json,
                json!({ "configuration": configuration, "verdict": verdict }),
                || println!("{}: {}", configuration, format_verdict(&verdict)),
            )
        }

        Commands::Mappings { file } => {
            session.append_symbol_mappings(&file)?;
            session.save_configuration()?;
            report(json, json!({ "mappings": file }), || {
                println!("Symbol mappings replaced by {}", file.display())
            })
        }

        Commands::Logging { name } => {
            session.set_logging_target(&name)?;
            session.save_configuration()?;
            report(json, json!({ "logging": name }), || {
                println!("Logging to {}", name)
            })
        }

        Commands::Status => {
            let status = status(session)?;
            report(json, status.clone(), || print_status(&status))
        }

        Commands::Test { .. } => unreachable!("test scenarios are dispatched before connecting"),
    }
}

/// Describe both bindings without failing when one is missing
fn status(session: &mut Session) -> Result<Value> {
    let configuration_name = session.application()?.configuration()?.name()?;

    let environment = match session.check_environment() {
        Ok(binding) => json!({
            "name": binding.environment.name()?,
            "module": binding.module.name()?,
        }),
        Err(e) => json!({ "error": e.to_string() }),
    };

    let test_configuration = match session.check_configuration() {
        Ok(binding) => json!({
            "name": binding.configuration.name()?,
            "unit": binding.unit.name()?,
            "trigger": binding.settings.start_on_sys_var()?,
            "report": binding.unit_report.full_path()?,
        }),
        Err(e) => json!({ "error": e.to_string() }),
    };

    Ok(json!({
        "configuration": configuration_name,
        "state": session.state().to_string(),
        "environment": environment,
        "test_configuration": test_configuration,
    }))
}

fn print_status(status: &Value) {
    println!("Configuration: {}", status["configuration"].as_str().unwrap_or("").bold());
    println!("State: {}", status["state"].as_str().unwrap_or(""));

    let environment = &status["environment"];
    match environment["error"].as_str() {
        Some(e) => println!("  {} Test environment: {}", "✗".red(), e),
        None => println!(
            "  {} Test environment: {} / {}",
            "✓".green(),
            environment["name"].as_str().unwrap_or(""),
            environment["module"].as_str().unwrap_or("")
        ),
    }

    let configuration = &status["test_configuration"];
    match configuration["error"].as_str() {
        Some(e) => println!("  {} Test configuration: {}", "✗".red(), e),
        None => {
            println!(
                "  {} Test configuration: {} / {}",
                "✓".green(),
                configuration["name"].as_str().unwrap_or(""),
                configuration["unit"].as_str().unwrap_or("")
            );
            if let Some(trigger) = configuration["trigger"].as_str().filter(|t| !t.is_empty()) {
                println!("      trigger: {}", trigger);
            }
            if let Some(path) = configuration["report"].as_str().filter(|p| !p.is_empty()) {
                println!("      report:  {}", path);
            }
        }
    }
}

fn format_verdict(verdict: &VariableValue) -> String {
    verdict.to_string().bold().to_string()
}

fn report(json: bool, value: Value, text: impl FnOnce()) -> Result<()> {
    if json {
        print_json(&value)
    } else {
        text();
        Ok(())
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an error the way the output mode expects
pub fn print_error(error: &Error, json: bool) {
    if json {
        let value = json!({
            "error": { "code": error.code(), "message": error.to_string() }
        });
        println!("{}", value);
    } else {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }
}
