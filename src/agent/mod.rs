//! Agent module - Orchestration of model and tool calls
//!
//! This module turns a user message into an answer. The agent is responsible for:
//!
//! - Rejecting empty messages and concurrent use of one session
//! - Building the model context from the system prompt and conversation history
//! - Calling the LLM provider and executing the tool calls it requests
//! - Feeding tool results (including tool errors) back to the model
//! - Bounding the number of round-trips per message
//! - Committing the finished exchange to the session's conversation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CLI / HTTP │────>│  AgentLoop  │────>│ LLMProvider │
//! │   (ask)     │     │             │     │ (OpenRouter)│
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            │
//!                            ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Session   │     │ ToolInvoker │──> tool server
//!                     │   Manager   │     │             │    (/invoke)
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_assistant::agent::AgentLoop;
//! use mcp_assistant::config::Config;
//!
//! async fn run_agent() -> mcp_assistant::error::Result<()> {
//!     let config = Config::load()?;
//!     let agent = AgentLoop::from_config(&config)?;
//!
//!     let answer = agent.ask("cli", "What files are in /tmp?").await?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```

mod context;
mod r#loop;

pub use context::ContextBuilder;
pub use r#loop::AgentLoop;
