//! Bridge client
//!
//! Spawns the bridge process and hands out remote handles that translate
//! every capability call into one synchronous request/response exchange.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::remote::{
    Application, Configuration, ConfigurationReport, ElementRef, LoggingBlocks, Measurement,
    Report, SymbolMappings, TestConfiguration, TestConfigurationSettings, TestConfigurations,
    TestElement, TestEnvironment, TestEnvironments, TestModule, TestUnit, TestUnits,
    VariableStore, VariableValue,
};

use super::codec;
use super::protocol::{Request, Response, Target, Tree};

/// How long the bridge gets to exit after its input is closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection to a bridge process
pub struct BridgeClient {
    process: Option<Child>,
    reader: Box<dyn BufRead>,
    writer: Box<dyn Write>,
    seq: i64,
}

impl BridgeClient {
    /// Spawn the bridge and connect to its stdio
    pub fn spawn(path: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::BridgeStartFailed(format!("{}: {}", path.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::BridgeStartFailed("Failed to get bridge stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::BridgeStartFailed("Failed to get bridge stdout".to_string()))?;

        tracing::debug!(bridge = %path.display(), pid = child.id(), "Bridge started");

        Ok(Self {
            process: Some(child),
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            seq: 1,
        })
    }

    /// Connect over already-open streams
    pub fn from_streams(reader: impl BufRead + 'static, writer: impl Write + 'static) -> Self {
        Self {
            process: None,
            reader: Box::new(reader),
            writer: Box::new(writer),
            seq: 1,
        }
    }

    /// Send a request and wait for its response body
    pub fn request(&mut self, target: &Target, command: &str, arguments: Value) -> Result<Value> {
        let seq = self.seq;
        self.seq += 1;

        let request = Request {
            seq,
            command: command.to_string(),
            target: target.clone(),
            arguments,
        };
        let json = serde_json::to_string(&request)?;
        tracing::trace!(seq, command, "bridge request");
        codec::write_message(&mut self.writer, &json)?;

        let json = codec::read_message(&mut self.reader)?;
        let response: Response = serde_json::from_str(&json)
            .map_err(|e| Error::BridgeProtocol(format!("Invalid response: {}", e)))?;

        if response.request_seq != seq {
            return Err(Error::BridgeProtocol(format!(
                "Response to request {} while waiting for {}",
                response.request_seq, seq
            )));
        }

        if response.success {
            Ok(response.body)
        } else {
            let message = response
                .message
                .unwrap_or_else(|| "request failed".to_string());
            Err(Error::remote(command, message))
        }
    }

    /// Wrap the connection as the remote tool's root object
    pub fn into_application(self) -> Box<dyn Application> {
        Box::new(RemoteObject {
            client: Rc::new(RefCell::new(self)),
            target: Target::Application,
        })
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        let Some(mut child) = self.process.take() else {
            return;
        };

        // Closing stdin tells the bridge to exit
        self.writer = Box::new(std::io::sink());

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(?status, "Bridge exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(20));
                }
                _ => break,
            }
        }

        tracing::warn!("Bridge did not exit, killing it");
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Handle on one remote object
struct RemoteObject {
    client: Rc<RefCell<BridgeClient>>,
    target: Target,
}

impl RemoteObject {
    fn at(&self, target: Target) -> Box<RemoteObject> {
        Box::new(RemoteObject {
            client: Rc::clone(&self.client),
            target,
        })
    }

    fn call(&self, command: &str, arguments: Value) -> Result<Value> {
        self.client
            .borrow_mut()
            .request(&self.target, command, arguments)
    }

    fn query<T: DeserializeOwned>(&self, command: &str, arguments: Value) -> Result<T> {
        let body = self.call(command, arguments)?;
        serde_json::from_value(body)
            .map_err(|e| Error::BridgeProtocol(format!("Unexpected '{}' result: {}", command, e)))
    }

    fn send(&self, command: &str, arguments: Value) -> Result<()> {
        self.call(command, arguments).map(|_| ())
    }

    fn tree(&self) -> Result<Tree> {
        match &self.target {
            Target::TestModule {
                environment,
                module,
            } => Ok(Tree::TestModule {
                environment: *environment,
                module: *module,
            }),
            Target::TestUnit {
                configuration,
                unit,
            } => Ok(Tree::TestUnit {
                configuration: *configuration,
                unit: *unit,
            }),
            other => Err(Error::BridgeProtocol(format!(
                "{:?} does not own a test tree",
                other
            ))),
        }
    }

    fn top_elements(&self) -> Result<Vec<ElementRef>> {
        let tree = self.tree()?;
        let count: usize = self.query("element_count", Value::Null)?;
        Ok((0..count)
            .map(|i| self.at(Target::top_element(tree, i)) as ElementRef)
            .collect())
    }
}

fn path_arg(path: &Path) -> Value {
    json!({ "path": path.to_string_lossy() })
}

impl Application for RemoteObject {
    fn open(&self, path: &Path) -> Result<()> {
        self.send("open", path_arg(path))
    }

    fn set_visible(&self, visible: bool) -> Result<()> {
        self.send("set_visible", json!({ "visible": visible }))
    }

    fn quit(&self) -> Result<()> {
        self.send("quit", Value::Null)
    }

    fn configuration(&self) -> Result<Box<dyn Configuration>> {
        Ok(self.at(Target::Configuration))
    }

    fn measurement(&self) -> Result<Box<dyn Measurement>> {
        Ok(self.at(Target::Measurement))
    }

    fn variables(&self) -> Result<Box<dyn VariableStore>> {
        Ok(self.at(Target::Variables))
    }
}

impl Measurement for RemoteObject {
    fn start(&self) -> Result<()> {
        self.send("start", Value::Null)
    }

    fn stop(&self) -> Result<()> {
        self.send("stop", Value::Null)
    }

    fn is_running(&self) -> Result<bool> {
        self.query("running", Value::Null)
    }
}

impl VariableStore for RemoteObject {
    fn get(&self, namespace: &str, name: &str) -> Result<VariableValue> {
        self.query("get", json!({ "namespace": namespace, "name": name }))
    }

    fn set(&self, namespace: &str, name: &str, value: VariableValue) -> Result<()> {
        self.send(
            "set",
            json!({ "namespace": namespace, "name": name, "value": value }),
        )
    }
}

impl Configuration for RemoteObject {
    fn name(&self) -> Result<String> {
        self.query("name", Value::Null)
    }

    fn save(&self) -> Result<()> {
        self.send("save", Value::Null)
    }

    fn test_environments(&self) -> Result<Box<dyn TestEnvironments>> {
        Ok(self.at(Target::TestEnvironments))
    }

    fn test_configurations(&self) -> Result<Box<dyn TestConfigurations>> {
        Ok(self.at(Target::TestConfigurations))
    }

    fn symbol_mappings(&self) -> Result<Box<dyn SymbolMappings>> {
        Ok(self.at(Target::SymbolMappings))
    }

    fn logging_blocks(&self) -> Result<Box<dyn LoggingBlocks>> {
        Ok(self.at(Target::LoggingBlocks))
    }
}

impl TestEnvironments for RemoteObject {
    fn count(&self) -> Result<usize> {
        self.query("count", Value::Null)
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestEnvironment>> {
        Ok(self.at(Target::TestEnvironment { environment: index }))
    }

    fn add(&self, path: &Path) -> Result<()> {
        self.send("add", path_arg(path))
    }

    fn remove(&self, index: usize) -> Result<()> {
        self.send("remove", json!({ "index": index }))
    }
}

impl TestEnvironment for RemoteObject {
    fn name(&self) -> Result<String> {
        self.query("name", Value::Null)
    }

    fn module_count(&self) -> Result<usize> {
        self.query("module_count", Value::Null)
    }

    fn module(&self, index: usize) -> Result<Box<dyn TestModule>> {
        match self.target {
            Target::TestEnvironment { environment } => Ok(self.at(Target::TestModule {
                environment,
                module: index,
            })),
            _ => Err(Error::BridgeProtocol("not a test environment".to_string())),
        }
    }
}

impl TestModule for RemoteObject {
    fn name(&self) -> Result<String> {
        self.query("name", Value::Null)
    }

    fn elements(&self) -> Result<Vec<ElementRef>> {
        self.top_elements()
    }

    fn report(&self) -> Result<Box<dyn Report>> {
        Ok(self.at(self.target.clone()))
    }

    fn start(&self) -> Result<()> {
        self.send("start", Value::Null)
    }
}

impl TestConfigurations for RemoteObject {
    fn count(&self) -> Result<usize> {
        self.query("count", Value::Null)
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestConfiguration>> {
        Ok(self.at(Target::TestConfiguration {
            configuration: index,
        }))
    }

    fn add(&self) -> Result<Box<dyn TestConfiguration>> {
        let index: usize = self.query("add", Value::Null)?;
        Ok(self.at(Target::TestConfiguration {
            configuration: index,
        }))
    }

    fn remove(&self, index: usize) -> Result<()> {
        self.send("remove", json!({ "index": index }))
    }
}

impl TestConfiguration for RemoteObject {
    fn name(&self) -> Result<String> {
        self.query("name", Value::Null)
    }

    fn settings(&self) -> Result<Box<dyn TestConfigurationSettings>> {
        Ok(self.at(self.target.clone()))
    }

    fn report(&self) -> Result<Box<dyn ConfigurationReport>> {
        Ok(self.at(self.target.clone()))
    }

    fn units(&self) -> Result<Box<dyn TestUnits>> {
        match self.target {
            Target::TestConfiguration { configuration } => {
                Ok(self.at(Target::TestUnits { configuration }))
            }
            _ => Err(Error::BridgeProtocol(
                "not a test configuration".to_string(),
            )),
        }
    }

    fn import_variant_profiles(&self, path: &Path) -> Result<()> {
        self.send("import_variant_profiles", path_arg(path))
    }
}

impl TestConfigurationSettings for RemoteObject {
    fn start_on_sys_var(&self) -> Result<String> {
        self.query("start_on_sys_var", Value::Null)
    }

    fn set_start_on_sys_var(&self, variable: &str) -> Result<()> {
        self.send("set_start_on_sys_var", json!({ "value": variable }))
    }

    fn ignore_break_on_fail(&self) -> Result<bool> {
        self.query("ignore_break_on_fail", Value::Null)
    }

    fn set_ignore_break_on_fail(&self, ignore: bool) -> Result<()> {
        self.send("set_ignore_break_on_fail", json!({ "value": ignore }))
    }
}

impl ConfigurationReport for RemoteObject {
    fn use_joint_report(&self) -> Result<bool> {
        self.query("use_joint_report", Value::Null)
    }

    fn set_use_joint_report(&self, joint: bool) -> Result<()> {
        self.send("set_use_joint_report", json!({ "value": joint }))
    }
}

impl TestUnits for RemoteObject {
    fn count(&self) -> Result<usize> {
        self.query("count", Value::Null)
    }

    fn item(&self, index: usize) -> Result<Box<dyn TestUnit>> {
        match self.target {
            Target::TestUnits { configuration } => Ok(self.at(Target::TestUnit {
                configuration,
                unit: index,
            })),
            _ => Err(Error::BridgeProtocol("not a test unit collection".to_string())),
        }
    }

    fn add(&self, path: &Path) -> Result<()> {
        self.send("add", path_arg(path))
    }
}

impl TestUnit for RemoteObject {
    fn name(&self) -> Result<String> {
        self.query("name", Value::Null)
    }

    fn elements(&self) -> Result<Vec<ElementRef>> {
        self.top_elements()
    }

    fn report(&self) -> Result<Box<dyn Report>> {
        Ok(self.at(self.target.clone()))
    }

    fn start(&self) -> Result<()> {
        self.send("start", Value::Null)
    }
}

impl Report for RemoteObject {
    fn is_enabled(&self) -> Result<bool> {
        self.query("report_enabled", Value::Null)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.send("set_report_enabled", json!({ "value": enabled }))
    }

    fn full_path(&self) -> Result<String> {
        self.query("report_path", Value::Null)
    }

    fn set_full_path(&self, path: &str) -> Result<()> {
        self.send("set_report_path", json!({ "value": path }))
    }
}

impl TestElement for RemoteObject {
    fn caption(&self) -> Result<String> {
        self.query("caption", Value::Null)
    }

    fn children(&self) -> Result<Vec<ElementRef>> {
        let Target::Element { tree, path } = &self.target else {
            return Err(Error::BridgeProtocol("not a test element".to_string()));
        };
        let count: usize = self.query("child_count", Value::Null)?;
        Ok((0..count)
            .map(|i| {
                let mut child = path.clone();
                child.push(i);
                self.at(Target::Element {
                    tree: *tree,
                    path: child,
                }) as ElementRef
            })
            .collect())
    }

    fn is_enabled(&self) -> Result<bool> {
        self.query("enabled", Value::Null)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.send("set_enabled", json!({ "value": enabled }))
    }
}

impl SymbolMappings for RemoteObject {
    fn clear(&self) -> Result<()> {
        self.send("clear", Value::Null)
    }

    fn append(&self, path: &Path) -> Result<String> {
        self.query("append", path_arg(path))
    }
}

impl LoggingBlocks for RemoteObject {
    fn count(&self) -> Result<usize> {
        self.query("count", Value::Null)
    }

    fn full_name(&self, index: usize) -> Result<String> {
        self.query("full_name", json!({ "index": index }))
    }

    fn set_full_name(&self, index: usize, name: &str) -> Result<()> {
        self.send("set_full_name", json!({ "index": index, "name": name }))
    }
}
