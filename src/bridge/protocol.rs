//! Bridge protocol messages
//!
//! Each request names a typed [`Target`] and a command valid for that
//! target. Collections and their items are addressed by zero-based index;
//! test elements by the tree they belong to plus a child-index path.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::Error;

/// Remote object a request is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Application,
    Measurement,
    Variables,
    Configuration,
    TestEnvironments,
    TestEnvironment {
        environment: usize,
    },
    /// Test module, including its report
    TestModule {
        environment: usize,
        module: usize,
    },
    TestConfigurations,
    /// Test configuration, including its settings and report
    TestConfiguration {
        configuration: usize,
    },
    TestUnits {
        configuration: usize,
    },
    /// Test unit, including its report
    TestUnit {
        configuration: usize,
        unit: usize,
    },
    Element {
        tree: Tree,
        path: Vec<usize>,
    },
    SymbolMappings,
    LoggingBlocks,
}

/// Owner of a test element tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tree {
    TestModule { environment: usize, module: usize },
    TestUnit { configuration: usize, unit: usize },
}

impl Target {
    /// Element `index` at the top of a tree
    pub fn top_element(tree: Tree, index: usize) -> Self {
        Self::Element {
            tree,
            path: vec![index],
        }
    }
}

/// Request sent to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

/// Response from the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_seq: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl Response {
    pub fn success(request_seq: i64, body: Value) -> Self {
        Self {
            request_seq,
            success: true,
            code: None,
            message: None,
            body,
        }
    }

    pub fn error(request_seq: i64, error: &Error) -> Self {
        // The client wraps the message in its own remote error again
        let message = match error {
            Error::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            request_seq,
            success: false,
            code: Some(error.code().to_string()),
            message: Some(message),
            body: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_target_shape() {
        let target = Target::Element {
            tree: Tree::TestUnit {
                configuration: 0,
                unit: 0,
            },
            path: vec![0, 2, 1],
        };
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "element",
                "tree": {"kind": "test_unit", "configuration": 0, "unit": 0},
                "path": [0, 2, 1]
            })
        );
        let back: Target = serde_json::from_value(value).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn test_request_without_arguments() {
        let request: Request = serde_json::from_str(
            r#"{"seq": 4, "command": "count", "target": {"kind": "test_environments"}}"#,
        )
        .unwrap();
        assert_eq!(request.target, Target::TestEnvironments);
        assert!(request.arguments.is_null());
    }

    #[test]
    fn test_error_response_carries_code() {
        let response = Response::error(7, &Error::EmptyTree);
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("EMPTY_TREE"));
        assert_eq!(response.request_seq, 7);
    }
}
