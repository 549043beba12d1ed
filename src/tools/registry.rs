//! Tool registry
//!
//! The registry is the static catalog advertised to the model. It is built
//! once at startup, never changes afterwards, and is shared read-only (behind
//! an `Arc`) by every conversation.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{AssistantError, Result};

use super::schema::{ParamType, ParameterSchema};

/// Name, description and parameter schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, parameters: ParameterSchema) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Function definition in the chat-completions `tools` format.
    pub fn definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters.to_json_schema(),
            }
        })
    }
}

/// Immutable catalog of tools, in declaration order.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry from `tools`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if two tools share a name or a name
    /// is empty. This is a startup failure, never a call-time one.
    pub fn new(tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tools.len());
        for (position, tool) in tools.iter().enumerate() {
            if tool.name.trim().is_empty() {
                return Err(AssistantError::Config(format!(
                    "tool at position {} has an empty name",
                    position
                )));
            }
            if index.insert(tool.name.clone(), position).is_some() {
                return Err(AssistantError::Config(format!(
                    "duplicate tool name '{}'",
                    tool.name
                )));
            }
        }
        Ok(Self { tools, index })
    }

    /// Registry holding [`builtin_tools`].
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_tools())
    }

    /// All descriptors, in stable declaration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions for every tool, in registry order.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }
}

/// The file, drive and email tools served by the external tool endpoint.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "list_files",
            "List files in a directory",
            ParameterSchema::new().required("directory", ParamType::Path, "Path to the folder"),
        ),
        ToolDescriptor::new(
            "read_file",
            "Read contents of a text file",
            ParameterSchema::new().required(
                "file_path",
                ParamType::Path,
                "Full path to the file",
            ),
        ),
        ToolDescriptor::new(
            "list_drive_files",
            "List file names from your Google Drive (by folder name)",
            ParameterSchema::new().optional(
                "folder_name",
                ParamType::String,
                "The name of the folder to list files from",
            ),
        ),
        ToolDescriptor::new(
            "read_drive_file",
            "Read the content of a Google Drive file (by file name)",
            ParameterSchema::new()
                .required("file_name", ParamType::String, "Name of the file to read")
                .optional(
                    "folder_name",
                    ParamType::String,
                    "Optional folder to limit file lookup",
                ),
        ),
        ToolDescriptor::new(
            "upload_drive_file",
            "Upload a local file to Google Drive",
            ParameterSchema::new()
                .required("file_path", ParamType::Path, "Path to the file to upload")
                .required(
                    "drive_filename",
                    ParamType::String,
                    "The name to give the file on Google Drive",
                ),
        ),
        ToolDescriptor::new(
            "list_emails",
            "List recent emails in a mailbox folder",
            ParameterSchema::new()
                .optional("folder", ParamType::String, "Mailbox folder, e.g. INBOX")
                .optional("limit", ParamType::Integer, "Maximum number of emails to list"),
        ),
        ToolDescriptor::new(
            "read_email",
            "Read the full content of an email",
            ParameterSchema::new().required(
                "message_id",
                ParamType::String,
                "Identifier returned by list_emails",
            ),
        ),
        ToolDescriptor::new(
            "send_email",
            "Send an email",
            ParameterSchema::new()
                .required("to", ParamType::String, "Recipient address")
                .required("subject", ParamType::String, "Subject line")
                .required("body", ParamType::String, "Plain-text body"),
        ),
    ]
}
