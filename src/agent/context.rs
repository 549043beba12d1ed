//! Context builder for model requests

use crate::providers::ChatMessage;
use crate::session::Turn;

/// Builds the message list sent to the model: the system preamble followed
/// by every turn of the conversation, in order.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
        }
    }

    pub fn build(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(&self.system_prompt));

        for turn in turns {
            let message = match turn {
                Turn::User { text, .. } => ChatMessage::user(text),
                Turn::Assistant {
                    text, tool_calls, ..
                } => {
                    if tool_calls.is_empty() {
                        ChatMessage::assistant(text.as_deref().unwrap_or_default())
                    } else {
                        ChatMessage::assistant_tool_calls(tool_calls)
                    }
                }
                Turn::ToolResult {
                    tool_call_id,
                    tool_name,
                    result,
                    ..
                } => ChatMessage::tool_result(tool_call_id, tool_name, &result.to_content()),
            };
            messages.push(message);
        }

        messages
    }
}
