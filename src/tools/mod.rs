//! Tools module - Tool catalog, argument validation and dispatch
//!
//! The assistant never runs tools itself. It advertises a fixed catalog to the
//! model and forwards the calls the model makes to an external tool server.
//!
//! - [`ToolRegistry`]: the immutable catalog of [`ToolDescriptor`]s
//! - [`ParameterSchema`]: per-tool parameter declarations and validation
//! - [`ToolEndpoint`]: transport to the external server ([`HttpToolEndpoint`])
//! - [`ToolInvoker`]: validate, dispatch with a timeout, always return a [`ToolResult`]

pub mod endpoint;
pub mod invoker;
pub mod registry;
pub mod schema;

pub use endpoint::{EndpointError, HttpToolEndpoint, ToolEndpoint};
pub use invoker::ToolInvoker;
pub use registry::{builtin_tools, ToolDescriptor, ToolRegistry};
pub use schema::{ArgumentIssue, ParamSpec, ParamType, ParameterSchema, ToolArguments};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Why a tool call produced no output.
///
/// All of these are recoverable: the error is handed back to the model as the
/// call's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolErrorKind {
    /// The model named a tool that is not in the registry.
    UnknownTool,
    /// The arguments did not match the tool's schema.
    InvalidArguments,
    /// The tool endpoint could not be reached or did not answer in time.
    ToolUnavailable,
    /// The tool ran and reported a failure of its own.
    ToolFailed,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolErrorKind::UnknownTool => "UnknownTool",
            ToolErrorKind::InvalidArguments => "InvalidArguments",
            ToolErrorKind::ToolUnavailable => "ToolUnavailable",
            ToolErrorKind::ToolFailed => "ToolFailed",
        };
        f.write_str(name)
    }
}

/// Outcome of a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    Ok(Value),
    Error { message: String, kind: ToolErrorKind },
}

impl ToolResult {
    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        ToolResult::Error {
            message: message.into(),
            kind,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolResult::Ok(_))
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            ToolResult::Ok(_) => None,
            ToolResult::Error { kind, .. } => Some(*kind),
        }
    }

    /// Serialized form sent to the model as the tool message content.
    ///
    /// Successful output is sent as-is; failures as
    /// `{"error": message, "kind": kind}` so the model can reason about them.
    pub fn to_content(&self) -> String {
        match self {
            ToolResult::Ok(Value::String(s)) => s.clone(),
            ToolResult::Ok(value) => value.to_string(),
            ToolResult::Error { message, kind } => json!({
                "error": message,
                "kind": kind,
            })
            .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_content() {
        let result = ToolResult::Ok(json!(["a.txt", "b.txt"]));
        assert!(result.is_ok());
        assert_eq!(result.to_content(), r#"["a.txt","b.txt"]"#);

        let text = ToolResult::Ok(json!("file body"));
        assert_eq!(text.to_content(), "file body");
    }

    #[test]
    fn test_error_content() {
        let result = ToolResult::error(ToolErrorKind::ToolUnavailable, "server down");
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolUnavailable));

        let content: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(content["error"], "server down");
        assert_eq!(content["kind"], "ToolUnavailable");
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [
            ToolErrorKind::UnknownTool,
            ToolErrorKind::InvalidArguments,
            ToolErrorKind::ToolUnavailable,
            ToolErrorKind::ToolFailed,
        ] {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, Value::String(kind.to_string()));
        }
    }
}
