//! Providers module - Language model clients
//!
//! The orchestration loop talks to the model through the [`LLMProvider`]
//! trait. A provider receives the full message list and the tool catalog and
//! answers with a [`ModelResponse`]: either a final answer or a batch of tool
//! calls.
//!
//! [`ChatMessage`] mirrors the chat-completions wire format, which is what
//! the bundled [`OpenAICompatProvider`] sends (OpenRouter, OpenAI and most
//! local servers accept it).

pub mod openai;

pub use openai::OpenAICompatProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::ToolCallRequest;
use crate::tools::ToolDescriptor;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function part of a wire tool call. `arguments` is a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Tool call as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

/// A message in a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant message carrying a tool-call batch.
    pub fn assistant_tool_calls(calls: &[ToolCallRequest]) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_type(),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, tool_name: &str, content: &str) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(tool_name.to_string()),
        }
    }
}

/// What the model decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// Final natural-language answer.
    Answer(String),
    /// One or more tool calls, to be executed in order.
    ToolCalls(Vec<ToolCallRequest>),
}

/// A language model that supports function calling.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name, for logs and errors.
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Ask the model for its next action.
    ///
    /// Failures are reported as
    /// [`ModelRequestFailed`](crate::error::AssistantError::ModelRequestFailed)
    /// or [`Timeout`](crate::error::AssistantError::Timeout).
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse>;
}
