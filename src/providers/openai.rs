//! OpenAI-compatible chat completions provider
//!
//! Talks to `POST {base_url}/chat/completions`. The default configuration
//! points at OpenRouter, which additionally wants the `HTTP-Referer` and
//! `X-Title` headers.
//!
//! Each request is bounded by the configured timeout. Retries are off unless
//! `max_retries` is set; when enabled they apply only to transport errors,
//! timeouts, HTTP 429 and 5xx, with exponential backoff.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{AssistantError, Result};
use crate::session::ToolCallRequest;
use crate::tools::ToolDescriptor;

use super::{ChatMessage, LLMProvider, ModelResponse, WireToolCall};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Outcome of one attempt, split by whether another attempt may help.
enum AttemptError {
    Retryable(AssistantError),
    Fatal(AssistantError),
}

/// Provider for any OpenAI-compatible chat completions API.
pub struct OpenAICompatProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    referer: String,
    title: String,
}

impl OpenAICompatProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        if config.api_key.is_none() {
            warn!("No provider API key configured; requests are sent unauthenticated");
        }
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            referer: config.referer.clone(),
            title: config.title.clone(),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> std::result::Result<ModelResponse, AttemptError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            tools: tools.iter().map(ToolDescriptor::definition).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let exchange = async {
            let response = request.send().await.map_err(|e| {
                AttemptError::Retryable(AssistantError::ModelRequestFailed(format!(
                    "could not reach {}: {}",
                    self.endpoint, e
                )))
            })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = AssistantError::ModelRequestFailed(format!(
                    "provider responded with {}: {}",
                    status, text
                ));
                return Err(if status.as_u16() == 429 || status.is_server_error() {
                    AttemptError::Retryable(err)
                } else {
                    AttemptError::Fatal(err)
                });
            }

            response.json::<CompletionResponse>().await.map_err(|e| {
                AttemptError::Fatal(AssistantError::ModelRequestFailed(format!(
                    "unreadable provider response: {}",
                    e
                )))
            })
        };

        let completion = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AttemptError::Retryable(AssistantError::Timeout(
                    self.timeout.as_secs(),
                )))
            }
        };

        parse_completion(completion).map_err(AttemptError::Fatal)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let mut attempt = 0;
        loop {
            match self.attempt(messages, tools).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Retryable(err)) if attempt < self.max_retries => {
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Retryable(err)) | Err(AttemptError::Fatal(err)) => {
                    return Err(err)
                }
            }
        }
    }
}

/// Turn a completion into the next action.
///
/// Tool calls win over text when a model sends both. Argument strings that
/// are not valid JSON are kept verbatim so the invoker rejects them.
fn parse_completion(completion: CompletionResponse) -> Result<ModelResponse> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| AssistantError::ModelRequestFailed("provider returned no choices".into()))?;

    let tool_calls = message.tool_calls.unwrap_or_default();
    if !tool_calls.is_empty() {
        let calls = tool_calls
            .into_iter()
            .map(|call| {
                let id = if call.id.trim().is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                let raw = call.function.arguments;
                let arguments = if raw.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                };
                ToolCallRequest {
                    id,
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();
        return Ok(ModelResponse::ToolCalls(calls));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(ModelResponse::Answer(text)),
        _ => Err(AssistantError::ModelRequestFailed(
            "model returned neither text nor tool calls".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use axum::{
        extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn completion(value: Value) -> CompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_plain_answer() {
        let response = parse_completion(completion(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
        })))
        .unwrap();
        assert_eq!(response, ModelResponse::Answer("Hello!".into()));
    }

    #[test]
    fn test_parse_tool_calls_in_order() {
        let response = parse_completion(completion(json!({
            "choices": [{"message": {
                "content": "Let me check.",
                "tool_calls": [
                    {"id": "a", "type": "function", "function": {"name": "list_files", "arguments": "{\"directory\":\"/tmp\"}"}},
                    {"id": "b", "type": "function", "function": {"name": "read_file", "arguments": "{\"file_path\":\"/tmp/a.txt\"}"}}
                ]
            }}]
        })))
        .unwrap();

        let ModelResponse::ToolCalls(calls) = response else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments, json!({"directory": "/tmp"}));
        assert_eq!(calls[1].name, "read_file");
    }

    #[test]
    fn test_parse_fills_missing_id_and_keeps_bad_arguments() {
        let response = parse_completion(completion(json!({
            "choices": [{"message": {"tool_calls": [
                {"function": {"name": "list_files", "arguments": "{directory: /tmp"}},
                {"function": {"name": "list_drive_files", "arguments": ""}}
            ]}}]
        })))
        .unwrap();

        let ModelResponse::ToolCalls(calls) = response else {
            panic!("expected tool calls");
        };
        assert!(calls[0].id.starts_with("call_"));
        assert_ne!(calls[0].id, calls[1].id);
        assert_eq!(calls[0].arguments, json!("{directory: /tmp"));
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn test_parse_empty_response_is_error() {
        let err = parse_completion(completion(json!({"choices": []}))).unwrap_err();
        assert!(matches!(err, AssistantError::ModelRequestFailed(_)));

        let err = parse_completion(completion(json!({
            "choices": [{"message": {"content": null}}]
        })))
        .unwrap_err();
        assert!(err.to_string().contains("neither text nor tool calls"));
    }

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<Value>>>,
        headers: Arc<Mutex<Vec<HeaderMap>>>,
        hits: Arc<AtomicUsize>,
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn provider_for(base_url: &str, max_retries: u32) -> OpenAICompatProvider {
        OpenAICompatProvider::from_config(&ProviderConfig {
            api_key: Some("sk-test".into()),
            base_url: base_url.to_string(),
            max_retries,
            retry_backoff_ms: 1,
            ..ProviderConfig::default()
        })
    }

    #[tokio::test]
    async fn test_request_carries_tools_and_headers() {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        rec.bodies.lock().unwrap().push(body);
                        rec.headers.lock().unwrap().push(headers);
                        Json(json!({"choices": [{"message": {"content": "Hi"}}]}))
                    },
                ),
            )
            .with_state(recorded.clone());

        let provider = provider_for(&serve(app).await, 0);
        let registry = ToolRegistry::builtin().unwrap();
        let response = provider
            .chat(
                &[ChatMessage::system("be nice"), ChatMessage::user("hello")],
                registry.list(),
            )
            .await
            .unwrap();
        assert_eq!(response, ModelResponse::Answer("Hi".into()));

        let body = recorded.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "google/gemini-2.0-flash-001");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().unwrap().len(), registry.len());
        assert_eq!(body["messages"][1]["content"], "hello");

        let headers = recorded.headers.lock().unwrap()[0].clone();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(headers["x-title"], "Local MCP App");
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|State(rec): State<Recorded>| async move {
                    rec.hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::UNAUTHORIZED, "invalid key")
                }),
            )
            .with_state(recorded.clone());

        let provider = provider_for(&serve(app).await, 3);
        let err = provider
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("401"));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retried_until_success() {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|State(rec): State<Recorded>| async move {
                    if rec.hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err((StatusCode::TOO_MANY_REQUESTS, "slow down"))
                    } else {
                        Ok(Json(json!({"choices": [{"message": {"content": "finally"}}]})))
                    }
                }),
            )
            .with_state(recorded.clone());

        let provider = provider_for(&serve(app).await, 2);
        let response = provider.chat(&[ChatMessage::user("hi")], &[]).await.unwrap();

        assert_eq!(response, ModelResponse::Answer("finally".into()));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|State(rec): State<Recorded>| async move {
                    rec.hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_GATEWAY, "upstream down")
                }),
            )
            .with_state(recorded.clone());

        let provider = provider_for(&serve(app).await, 0);
        assert!(provider.chat(&[ChatMessage::user("hi")], &[]).await.is_err());
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": []}))
            }),
        );

        let provider =
            provider_for(&serve(app).await, 0).with_timeout(Duration::from_millis(100));
        let err = provider
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Timeout(_)));
    }
}
