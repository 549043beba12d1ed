//! Orchestration loop
//!
//! Turns one user message into a final answer:
//!
//! ```text
//!            ┌──────────────── tool results appended ───────────────┐
//!            ▼                                                      │
//!   ┌───────────────┐  tool-call batch   ┌────────────────┐         │
//!   │ AwaitingModel │ ─────────────────> │ ExecutingTools │ ────────┘
//!   └───────────────┘                    └────────────────┘
//!            │ plain answer
//!            ▼
//!      ┌──────────┐
//!      │ Terminal │
//!      └──────────┘
//! ```
//!
//! Every visit to `AwaitingModel` is one round-trip; the loop gives up with
//! [`AssistantError::LoopBudgetExceeded`] rather than exceed the configured
//! maximum. Tool failures are not loop failures: they are recorded as tool
//! results and the model decides what to do about them.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, Config};
use crate::error::{AssistantError, Result};
use crate::providers::{LLMProvider, ModelResponse, OpenAICompatProvider};
use crate::session::{Conversation, Exchange, SessionManager, ToolCallRequest, Turn};
use crate::tools::{HttpToolEndpoint, ToolInvoker, ToolRegistry};

use super::context::ContextBuilder;

/// Where the loop is for the current user message.
#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Terminal(String),
}

/// The orchestration loop shared by every session.
///
/// The loop itself holds no conversation state; each call operates on the
/// conversation of one session, so independent sessions can be served
/// concurrently from the same `AgentLoop`.
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    invoker: ToolInvoker,
    context: ContextBuilder,
    sessions: SessionManager,
    max_round_trips: u32,
}

impl AgentLoop {
    pub fn new(config: &AgentConfig, provider: Arc<dyn LLMProvider>, invoker: ToolInvoker) -> Self {
        Self {
            provider,
            invoker,
            context: ContextBuilder::new(&config.system_prompt),
            sessions: SessionManager::with_max_sessions(config.max_sessions),
            max_round_trips: config.max_round_trips,
        }
    }

    /// Wire up the HTTP provider, the HTTP tool endpoint and the built-in registry.
    ///
    /// # Errors
    ///
    /// Fails if the configuration or the tool catalog is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ToolRegistry::builtin()?);
        let endpoint = Arc::new(HttpToolEndpoint::new(&config.tools.endpoint));
        let invoker = ToolInvoker::new(
            registry,
            endpoint,
            config.tool_timeout(),
            &config.tools.dependency_hint,
        );
        let provider = Arc::new(OpenAICompatProvider::from_config(&config.provider));
        Ok(Self::new(&config.agent, provider, invoker))
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.invoker.registry()
    }

    pub fn max_round_trips(&self) -> u32 {
        self.max_round_trips
    }

    /// Answer `message` within the session named `session_key`.
    pub async fn ask(&self, session_key: &str, message: &str) -> Result<String> {
        self.ask_with_cancel(session_key, message, &CancellationToken::new())
            .await
    }

    /// Like [`ask`](Self::ask), aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`AssistantError::EmptyMessage`] before any model call
    /// - [`AssistantError::SessionBusy`] if the session is already answering
    /// - any error from [`run`](Self::run)
    pub async fn ask_with_cancel(
        &self,
        session_key: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if message.trim().is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let mut conversation = self.sessions.acquire(session_key).await?;
        self.run(&mut conversation, message, cancel).await
    }

    /// Drive one user message through the state machine on `conversation`.
    ///
    /// The user turn and everything the loop produces are committed to the
    /// conversation only when a final answer is reached. On error or
    /// cancellation the conversation is left exactly as it was.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::EmptyMessage);
        }

        let session = conversation.id().to_string();
        let mut exchange = conversation.begin();
        exchange.append(Turn::user(message))?;
        info!(session = %session, "Processing user message");

        let mut state = LoopState::AwaitingModel;
        let mut round_trips: u32 = 0;
        let mut tool_calls_made: usize = 0;

        let outcome: Result<String> = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    round_trips += 1;
                    debug!(
                        session = %session,
                        provider = self.provider.name(),
                        model = self.provider.model(),
                        round_trip = round_trips,
                        "Awaiting model"
                    );

                    let messages = self.context.build(&exchange.snapshot());
                    let response = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Err(AssistantError::Cancelled),
                        response = self.provider.chat(&messages, self.registry().list()) => response,
                    };

                    match response {
                        Err(e) => break Err(e),
                        Ok(ModelResponse::Answer(text)) => {
                            if let Err(e) = exchange.append(Turn::assistant(&text)) {
                                break Err(e);
                            }
                            LoopState::Terminal(text)
                        }
                        Ok(ModelResponse::ToolCalls(calls)) => {
                            let calls = assign_unique_ids(calls, &exchange);
                            // The results of this batch could only be read by
                            // a model call the budget no longer allows
                            if round_trips >= self.max_round_trips {
                                warn!(
                                    session = %session,
                                    max_round_trips = self.max_round_trips,
                                    "Model still requesting tools at round-trip limit"
                                );
                                break Err(AssistantError::LoopBudgetExceeded(self.max_round_trips));
                            }
                            if let Err(e) = exchange.append(Turn::assistant_tool_calls(calls.clone())) {
                                break Err(e);
                            }
                            LoopState::ExecutingTools(calls)
                        }
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let mut failed = None;
                    for call in calls {
                        info!(session = %session, tool = %call.name, id = %call.id, "Executing tool");
                        let result = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                failed = Some(AssistantError::Cancelled);
                                break;
                            }
                            result = self.invoker.invoke(&call.name, &call.arguments) => result,
                        };
                        if let Some(kind) = result.error_kind() {
                            warn!(session = %session, tool = %call.name, kind = %kind, "Tool returned an error; forwarding to model");
                        }
                        tool_calls_made += 1;
                        if let Err(e) = exchange.append(Turn::tool_result(&call.id, &call.name, result)) {
                            failed = Some(e);
                            break;
                        }
                    }
                    match failed {
                        Some(e) => break Err(e),
                        None => LoopState::AwaitingModel,
                    }
                }
                LoopState::Terminal(text) => break Ok(text),
            };
        };

        match outcome {
            Ok(text) => {
                let committed = exchange.commit()?;
                info!(
                    session = %session,
                    round_trips,
                    tool_calls = tool_calls_made,
                    turns = committed,
                    "Answer produced"
                );
                Ok(text)
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(session = %session, error = %e, "Conversation invariant violated");
                } else {
                    warn!(session = %session, round_trips, error = %e, "User message aborted");
                }
                Err(e)
            }
        }
    }
}

/// Give every call in a batch an id not yet used in the conversation.
///
/// Some models number calls by position and reuse ids such as `tool_0` in
/// every reply. Blank, repeated and already-seen ids get a fresh one.
fn assign_unique_ids(calls: Vec<ToolCallRequest>, exchange: &Exchange<'_>) -> Vec<ToolCallRequest> {
    let mut batch = HashSet::new();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.trim().is_empty()
                || exchange.knows_tool_call(&call.id)
                || batch.contains(&call.id)
            {
                let fresh = format!("call_{}", uuid::Uuid::new_v4().simple());
                debug!(original = %call.id, id = %fresh, "Reassigning tool call id");
                call.id = fresh;
            }
            batch.insert(call.id.clone());
            call
        })
        .collect()
}
