//! Tool invoker
//!
//! Validates a tool call against the registry and dispatches it to the
//! external endpoint with a bounded timeout. Whatever happens, the caller
//! gets a [`ToolResult`] back; nothing escapes as a Rust error.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::endpoint::{EndpointError, ToolEndpoint};
use super::registry::ToolRegistry;
use super::{ToolErrorKind, ToolResult};

/// Dispatches validated tool calls to a [`ToolEndpoint`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mcp_assistant::tools::{HttpToolEndpoint, ToolErrorKind, ToolInvoker, ToolRegistry};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let invoker = ToolInvoker::new(
///     Arc::new(ToolRegistry::builtin().unwrap()),
///     Arc::new(HttpToolEndpoint::new("http://localhost:3001")),
///     Duration::from_secs(5),
///     "the tool server",
/// );
/// let result = invoker.invoke("format_disk", &json!({})).await;
/// assert_eq!(result.error_kind(), Some(ToolErrorKind::UnknownTool));
/// # });
/// ```
#[derive(Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    endpoint: Arc<dyn ToolEndpoint>,
    timeout: Duration,
    dependency_hint: String,
}

impl ToolInvoker {
    pub fn new(
        registry: Arc<ToolRegistry>,
        endpoint: Arc<dyn ToolEndpoint>,
        timeout: Duration,
        dependency_hint: &str,
    ) -> Self {
        Self {
            registry,
            endpoint,
            timeout,
            dependency_hint: dependency_hint.to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Validate and run one tool call.
    pub async fn invoke(&self, tool_name: &str, arguments: &Value) -> ToolResult {
        let Some(descriptor) = self.registry.find(tool_name) else {
            warn!(tool = %tool_name, "Model requested unknown tool");
            return ToolResult::error(
                ToolErrorKind::UnknownTool,
                format!(
                    "Unknown tool '{}'. Available tools: {}",
                    tool_name,
                    self.registry.names().join(", ")
                ),
            );
        };

        let validated = match descriptor.parameters.validate(arguments) {
            Ok(args) => args,
            Err(issues) => {
                let detail: Vec<String> = issues.iter().map(ToString::to_string).collect();
                warn!(tool = %tool_name, issues = %detail.join("; "), "Rejected tool arguments");
                return ToolResult::error(
                    ToolErrorKind::InvalidArguments,
                    format!("Invalid arguments for '{}': {}", tool_name, detail.join("; ")),
                );
            }
        };

        let input = validated.into_value();
        debug!(tool = %tool_name, input = %input, "Invoking tool");

        let outcome = tokio::time::timeout(self.timeout, self.endpoint.call(tool_name, &input)).await;

        match outcome {
            Ok(Ok(output)) => ToolResult::Ok(output),
            Ok(Err(err)) => {
                warn!(tool = %tool_name, error = %err, "Tool call failed");
                self.translate(tool_name, err)
            }
            Err(_) => {
                warn!(tool = %tool_name, timeout = ?self.timeout, "Tool call timed out");
                ToolResult::error(
                    ToolErrorKind::ToolUnavailable,
                    format!(
                        "The tool endpoint at {} did not answer within {:?}. Please make sure {} is running.",
                        self.endpoint.address(),
                        self.timeout,
                        self.dependency_hint
                    ),
                )
            }
        }
    }

    fn translate(&self, tool_name: &str, err: EndpointError) -> ToolResult {
        match err {
            EndpointError::Unreachable(detail) => ToolResult::error(
                ToolErrorKind::ToolUnavailable,
                format!(
                    "Could not connect to the tool endpoint at {} ({}). Please make sure {} is running.",
                    self.endpoint.address(),
                    detail,
                    self.dependency_hint
                ),
            ),
            EndpointError::Rejected { status, body }
                if (400..500).contains(&status) && !matches!(status, 404 | 408 | 429) =>
            {
                ToolResult::error(
                    ToolErrorKind::InvalidArguments,
                    format!(
                        "The tool endpoint rejected the arguments for '{}' ({}): {}",
                        tool_name, status, body
                    ),
                )
            }
            EndpointError::Rejected { status, body } => ToolResult::error(
                ToolErrorKind::ToolUnavailable,
                format!(
                    "The tool endpoint at {} responded with {}: {}. Please make sure {} is running and up to date.",
                    self.endpoint.address(),
                    status,
                    body,
                    self.dependency_hint
                ),
            ),
            EndpointError::Failed(message) => {
                ToolResult::error(ToolErrorKind::ToolFailed, message)
            }
            EndpointError::Malformed(detail) => ToolResult::error(
                ToolErrorKind::ToolUnavailable,
                format!(
                    "The tool endpoint at {} sent an unexpected response ({}). Is {} the service listening there?",
                    self.endpoint.address(),
                    detail,
                    self.dependency_hint
                ),
            ),
        }
    }
}
