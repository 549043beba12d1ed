//! Error types for the assistant
//!
//! Loop-level failures surface to the caller as [`AssistantError`]. Tool-level
//! failures never become Rust errors: the invoker turns them into
//! [`ToolResult::Error`](crate::tools::ToolResult) so the model can see them.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the assistant library.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The inbound message was empty or whitespace only.
    #[error("Message is required")]
    EmptyMessage,

    /// The request body could not be read as an ask request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Another `ask` is still running on the same session.
    #[error("Session '{0}' is busy with another request")]
    SessionBusy(String),

    /// The language model provider failed (network, auth, rate limit, bad reply).
    #[error("Model request failed: {0}")]
    ModelRequestFailed(String),

    /// The model request did not finish within the configured timeout.
    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    /// The model kept requesting tools past the round-trip budget.
    #[error("Loop budget exceeded: model still requesting tools after {0} round-trips")]
    LoopBudgetExceeded(u32),

    /// The caller went away while the turn was in flight.
    #[error("Request cancelled")]
    Cancelled,

    /// The conversation log would be left inconsistent. Indicates a bug.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration, detected at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable, caller-visible name of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    EmptyMessage,
    InvalidRequest,
    SessionBusy,
    ModelRequestFailed,
    Timeout,
    LoopBudgetExceeded,
    Cancelled,
    InvariantViolation,
    Config,
    Internal,
}

impl AssistantError {
    /// Returns the kind used to tell failures apart at the API boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyMessage => ErrorKind::EmptyMessage,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::SessionBusy(_) => ErrorKind::SessionBusy,
            Self::ModelRequestFailed(_) => ErrorKind::ModelRequestFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::LoopBudgetExceeded(_) => ErrorKind::LoopBudgetExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error indicates a programming bug rather than a runtime condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, AssistantError>;
