//! Conversation turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolResult;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within the conversation.
    pub id: String,
    /// Registry name of the tool.
    pub name: String,
    /// Arguments as produced by the model, validated later by the invoker.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// One entry in a conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Either a final answer (`text`) or a batch of tool calls, never both.
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
        timestamp: DateTime<Utc>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: ToolResult,
        timestamp: DateTime<Utc>,
    },
}

impl Turn {
    pub fn user(text: &str) -> Self {
        Turn::User {
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// A final answer.
    pub fn assistant(text: &str) -> Self {
        Turn::Assistant {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A tool-call batch.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Turn::Assistant {
            text: None,
            tool_calls,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool_call_id: &str, tool_name: &str, result: ToolResult) -> Self {
        Turn::ToolResult {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User { .. })
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Turn::Assistant { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Turn::ToolResult { .. })
    }

    /// Text of a user turn or final answer.
    pub fn text(&self) -> Option<&str> {
        match self {
            Turn::User { text, .. } => Some(text),
            Turn::Assistant { text, .. } => text.as_deref(),
            Turn::ToolResult { .. } => None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Turn::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Turn::ToolResult { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Turn::User { timestamp, .. }
            | Turn::Assistant { timestamp, .. }
            | Turn::ToolResult { timestamp, .. } => *timestamp,
        }
    }
}
