//! mcp-assistant - Tool-calling assistant core
//!
//! A conversational front-end that lets a language model answer questions by
//! calling tools (local files, Google Drive, email) exposed by an external
//! tool server.
//!
//! - [`agent`]: the orchestration loop
//! - [`providers`]: language model clients
//! - [`tools`]: tool catalog, validation and dispatch
//! - [`session`]: conversation state per session
//! - [`server`]: HTTP API
//! - [`config`]: configuration loading

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod server;
pub mod session;
pub mod tools;

pub use agent::{AgentLoop, ContextBuilder};
pub use config::Config;
pub use error::{AssistantError, ErrorKind, Result};
pub use providers::{ChatMessage, LLMProvider, ModelResponse, OpenAICompatProvider};
pub use session::{Conversation, SessionManager, ToolCallRequest, Turn};
pub use tools::{
    HttpToolEndpoint, ToolDescriptor, ToolEndpoint, ToolErrorKind, ToolInvoker, ToolRegistry,
    ToolResult,
};
