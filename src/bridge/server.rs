//! Bridge server loop
//!
//! Serves the bridge protocol for any [`Application`], resolving each
//! request's target through the capability traits. The `mock-bridge`
//! binary uses it to put the in-memory model behind a real process
//! boundary.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::remote::{Application, ElementRef, Report, VariableValue};

use super::codec;
use super::protocol::{Request, Response, Target, Tree};

/// Answer requests until the client closes the stream or quits the tool
pub fn serve<R: BufRead, W: Write>(
    app: &dyn Application,
    reader: &mut R,
    writer: &mut W,
) -> Result<()> {
    loop {
        let json = match codec::read_message(reader) {
            Ok(json) => json,
            Err(Error::BridgeClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let request: Request = match serde_json::from_str(&json) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed request");
                let error = Error::BridgeProtocol(format!("Malformed request: {}", e));
                let response = Response::error(0, &error);
                codec::write_message(writer, &serde_json::to_string(&response)?)?;
                continue;
            }
        };

        tracing::debug!(seq = request.seq, command = %request.command, target = ?request.target, "request");

        let response = match dispatch(app, &request) {
            Ok(body) => Response::success(request.seq, body),
            Err(e) => Response::error(request.seq, &e),
        };
        codec::write_message(writer, &serde_json::to_string(&response)?)?;

        if request.target == Target::Application && request.command == "quit" && response.success
        {
            return Ok(());
        }
    }
}

/// Execute one request against the application
pub fn dispatch(app: &dyn Application, request: &Request) -> Result<Value> {
    let command = request.command.as_str();
    let args = &request.arguments;

    match &request.target {
        Target::Application => match command {
            "open" => done(app.open(&path(args)?)),
            "set_visible" => done(app.set_visible(arg(args, "visible")?)),
            "quit" => done(app.quit()),
            _ => unknown(request),
        },
        Target::Measurement => {
            let measurement = app.measurement()?;
            match command {
                "start" => done(measurement.start()),
                "stop" => done(measurement.stop()),
                "running" => value(measurement.is_running()?),
                _ => unknown(request),
            }
        }
        Target::Variables => {
            let variables = app.variables()?;
            let namespace: String = arg(args, "namespace")?;
            let name: String = arg(args, "name")?;
            match command {
                "get" => value(variables.get(&namespace, &name)?),
                "set" => {
                    let v: VariableValue = arg(args, "value")?;
                    done(variables.set(&namespace, &name, v))
                }
                _ => unknown(request),
            }
        }
        Target::Configuration => {
            let configuration = app.configuration()?;
            match command {
                "name" => value(configuration.name()?),
                "save" => done(configuration.save()),
                _ => unknown(request),
            }
        }
        Target::TestEnvironments => {
            let environments = app.configuration()?.test_environments()?;
            match command {
                "count" => value(environments.count()?),
                "add" => done(environments.add(&path(args)?)),
                "remove" => done(environments.remove(arg(args, "index")?)),
                _ => unknown(request),
            }
        }
        Target::TestEnvironment { environment } => {
            let environment = app
                .configuration()?
                .test_environments()?
                .item(*environment)?;
            match command {
                "name" => value(environment.name()?),
                "module_count" => value(environment.module_count()?),
                _ => unknown(request),
            }
        }
        Target::TestModule {
            environment,
            module,
        } => {
            let module = app
                .configuration()?
                .test_environments()?
                .item(*environment)?
                .module(*module)?;
            match command {
                "name" => value(module.name()?),
                "element_count" => value(module.elements()?.len()),
                "start" => done(module.start()),
                _ => report_command(module.report()?.as_ref(), request),
            }
        }
        Target::TestConfigurations => {
            let configurations = app.configuration()?.test_configurations()?;
            match command {
                "count" => value(configurations.count()?),
                "add" => {
                    configurations.add()?;
                    value(configurations.count()?.saturating_sub(1))
                }
                "remove" => done(configurations.remove(arg(args, "index")?)),
                _ => unknown(request),
            }
        }
        Target::TestConfiguration { configuration } => {
            let configuration = app
                .configuration()?
                .test_configurations()?
                .item(*configuration)?;
            match command {
                "name" => value(configuration.name()?),
                "import_variant_profiles" => {
                    done(configuration.import_variant_profiles(&path(args)?))
                }
                "start_on_sys_var" => value(configuration.settings()?.start_on_sys_var()?),
                "set_start_on_sys_var" => {
                    let variable: String = arg(args, "value")?;
                    done(configuration.settings()?.set_start_on_sys_var(&variable))
                }
                "ignore_break_on_fail" => {
                    value(configuration.settings()?.ignore_break_on_fail()?)
                }
                "set_ignore_break_on_fail" => done(
                    configuration
                        .settings()?
                        .set_ignore_break_on_fail(arg(args, "value")?),
                ),
                "use_joint_report" => value(configuration.report()?.use_joint_report()?),
                "set_use_joint_report" => {
                    done(configuration.report()?.set_use_joint_report(arg(args, "value")?))
                }
                _ => unknown(request),
            }
        }
        Target::TestUnits { configuration } => {
            let units = app
                .configuration()?
                .test_configurations()?
                .item(*configuration)?
                .units()?;
            match command {
                "count" => value(units.count()?),
                "add" => done(units.add(&path(args)?)),
                _ => unknown(request),
            }
        }
        Target::TestUnit {
            configuration,
            unit,
        } => {
            let unit = app
                .configuration()?
                .test_configurations()?
                .item(*configuration)?
                .units()?
                .item(*unit)?;
            match command {
                "name" => value(unit.name()?),
                "element_count" => value(unit.elements()?.len()),
                "start" => done(unit.start()),
                _ => report_command(unit.report()?.as_ref(), request),
            }
        }
        Target::Element { tree, path } => {
            let element = resolve_element(app, *tree, path)?;
            match command {
                "caption" => value(element.caption()?),
                "child_count" => value(element.children()?.len()),
                "enabled" => value(element.is_enabled()?),
                "set_enabled" => done(element.set_enabled(arg(args, "value")?)),
                _ => unknown(request),
            }
        }
        Target::SymbolMappings => {
            let mappings = app.configuration()?.symbol_mappings()?;
            match command {
                "clear" => done(mappings.clear()),
                "append" => value(mappings.append(&path(args)?)?),
                _ => unknown(request),
            }
        }
        Target::LoggingBlocks => {
            let blocks = app.configuration()?.logging_blocks()?;
            match command {
                "count" => value(blocks.count()?),
                "full_name" => value(blocks.full_name(arg(args, "index")?)?),
                "set_full_name" => {
                    let name: String = arg(args, "name")?;
                    done(blocks.set_full_name(arg(args, "index")?, &name))
                }
                _ => unknown(request),
            }
        }
    }
}

fn report_command(report: &dyn Report, request: &Request) -> Result<Value> {
    let args = &request.arguments;
    match request.command.as_str() {
        "report_enabled" => value(report.is_enabled()?),
        "set_report_enabled" => done(report.set_enabled(arg(args, "value")?)),
        "report_path" => value(report.full_path()?),
        "set_report_path" => {
            let path: String = arg(args, "value")?;
            done(report.set_full_path(&path))
        }
        _ => unknown(request),
    }
}

fn resolve_element(app: &dyn Application, tree: Tree, path: &[usize]) -> Result<ElementRef> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| Error::BridgeProtocol("Empty element path".to_string()))?;

    let top = match tree {
        Tree::TestModule {
            environment,
            module,
        } => app
            .configuration()?
            .test_environments()?
            .item(environment)?
            .module(module)?
            .elements()?,
        Tree::TestUnit {
            configuration,
            unit,
        } => app
            .configuration()?
            .test_configurations()?
            .item(configuration)?
            .units()?
            .item(unit)?
            .elements()?,
    };

    let mut element = pick(top, *first)?;
    for index in rest {
        element = pick(element.children()?, *index)?;
    }
    Ok(element)
}

fn pick(elements: Vec<ElementRef>, index: usize) -> Result<ElementRef> {
    let len = elements.len();
    elements.into_iter().nth(index).ok_or_else(|| {
        Error::remote(
            "element",
            format!("index {} out of range for {} elements", index, len),
        )
    })
}

fn arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T> {
    let raw = args
        .get(key)
        .cloned()
        .ok_or_else(|| Error::BridgeProtocol(format!("Missing argument '{}'", key)))?;
    serde_json::from_value(raw)
        .map_err(|e| Error::BridgeProtocol(format!("Invalid argument '{}': {}", key, e)))
}

fn path(args: &Value) -> Result<PathBuf> {
    arg::<String>(args, "path").map(PathBuf::from)
}

fn value<T: serde::Serialize>(v: T) -> Result<Value> {
    Ok(json!(v))
}

fn done(result: Result<()>) -> Result<Value> {
    result.map(|_| Value::Null)
}

fn unknown(request: &Request) -> Result<Value> {
    Err(Error::BridgeProtocol(format!(
        "Unknown command '{}' for {:?}",
        request.command, request.target
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{
        ConfigurationSpec, ElementSpec, MemoryTool, Snapshot, UnitSpec,
    };
    use std::io::{BufReader, Cursor};

    fn tool() -> MemoryTool {
        MemoryTool::new(Snapshot {
            test_configurations: vec![ConfigurationSpec::new(
                "Test_Configuration_1",
                vec![UnitSpec {
                    name: "body".to_string(),
                    elements: vec![ElementSpec::group(
                        "Doors",
                        vec![ElementSpec::leaf("Lock"), ElementSpec::leaf("Unlock")],
                    )],
                    ..UnitSpec::default()
                }],
            )],
            ..Snapshot::default()
        })
    }

    fn request(target: Target, command: &str, arguments: Value) -> Request {
        Request {
            seq: 1,
            command: command.to_string(),
            target,
            arguments,
        }
    }

    const UNIT: Tree = Tree::TestUnit {
        configuration: 0,
        unit: 0,
    };

    #[test]
    fn test_dispatch_element_path() {
        let tool = tool();
        let target = Target::Element {
            tree: UNIT,
            path: vec![0, 1],
        };

        let caption = dispatch(&tool, &request(target.clone(), "caption", Value::Null)).unwrap();
        assert_eq!(caption, json!("Unlock"));

        dispatch(&tool, &request(target, "set_enabled", json!({"value": true}))).unwrap();
        assert_eq!(
            tool.unit_leaves(),
            vec![("Lock".to_string(), false), ("Unlock".to_string(), true)]
        );
    }

    #[test]
    fn test_dispatch_bad_index() {
        let tool = tool();
        let target = Target::Element {
            tree: UNIT,
            path: vec![0, 5],
        };
        assert!(dispatch(&tool, &request(target, "caption", Value::Null)).is_err());
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let tool = tool();
        let err = dispatch(&tool, &request(Target::Measurement, "pause", Value::Null)).unwrap_err();
        assert!(matches!(err, Error::BridgeProtocol(_)));
    }

    #[test]
    fn test_dispatch_add_configuration_returns_index() {
        let tool = tool();
        let index = dispatch(
            &tool,
            &request(Target::TestConfigurations, "add", Value::Null),
        )
        .unwrap();
        assert_eq!(index, json!(1));
    }

    #[test]
    fn test_serve_stops_on_quit() {
        let tool = tool();
        let mut input = Vec::new();
        for (seq, command) in [(1, "set_visible"), (2, "quit"), (3, "open")] {
            let request = Request {
                seq,
                command: command.to_string(),
                target: Target::Application,
                arguments: json!({"visible": false, "path": "x.cfg"}),
            };
            codec::write_message(&mut input, &serde_json::to_string(&request).unwrap())
                .unwrap();
        }

        let mut reader = BufReader::new(Cursor::new(input));
        let mut output = Vec::new();
        serve(&tool, &mut reader, &mut output).unwrap();

        let mut responses = BufReader::new(Cursor::new(output));
        let mut seqs = Vec::new();
        while let Ok(json) = codec::read_message(&mut responses) {
            let response: Response = serde_json::from_str(&json).unwrap();
            assert!(response.success);
            seqs.push(response.request_seq);
        }
        assert_eq!(seqs, vec![1, 2]);
        assert!(tool.calls().contains(&"quit".to_string()));
    }
}
