//! External tool endpoint
//!
//! The tools themselves live in a separate server. This module speaks its
//! wire protocol:
//!
//! - `POST {endpoint}/invoke` with `{"tool": name, "input": arguments}`,
//!   answered by `{"output": payload}` or `{"error": message}`
//! - `GET {endpoint}/schema`, answered by `{"tools": [{"name": ...}, ...]}`

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure talking to the tool endpoint.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    /// The endpoint could not be reached (connection refused, DNS, reset).
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The endpoint answered with a non-success HTTP status.
    #[error("responded with {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The endpoint ran the tool and reported an in-band error.
    #[error("{0}")]
    Failed(String),
    /// The endpoint answered with something other than the expected JSON.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Transport used by the [`ToolInvoker`](super::ToolInvoker).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    /// Human-readable address, used in diagnostics.
    fn address(&self) -> String;

    /// Run `tool` with already-validated `input` and return its output payload.
    async fn call(&self, tool: &str, input: &Value) -> Result<Value, EndpointError>;
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    tool: &'a str,
    input: &'a Value,
}

/// [`ToolEndpoint`] over HTTP.
///
/// No timeout is set on the client; the invoker bounds each call.
///
/// # Example
/// ```
/// use mcp_assistant::tools::{HttpToolEndpoint, ToolEndpoint};
///
/// let endpoint = HttpToolEndpoint::new("http://localhost:3001/");
/// assert_eq!(endpoint.address(), "http://localhost:3001");
/// ```
#[derive(Debug, Clone)]
pub struct HttpToolEndpoint {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Names of the tools the endpoint advertises on `/schema`.
    ///
    /// A server that does not answer within `timeout` is reported as
    /// [`EndpointError::Unreachable`].
    pub async fn fetch_schema(&self, timeout: Duration) -> Result<Vec<String>, EndpointError> {
        tokio::time::timeout(timeout, self.schema_names())
            .await
            .map_err(|_| EndpointError::Unreachable(format!("no answer within {:?}", timeout)))?
    }

    async fn schema_names(&self) -> Result<Vec<String>, EndpointError> {
        let url = format!("{}/schema", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EndpointError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EndpointError::Malformed(e.to_string()))?;

        let tools = body
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| EndpointError::Malformed("missing 'tools' array".into()))?;

        Ok(tools
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ToolEndpoint for HttpToolEndpoint {
    fn address(&self) -> String {
        self.base_url.clone()
    }

    async fn call(&self, tool: &str, input: &Value) -> Result<Value, EndpointError> {
        let url = format!("{}/invoke", self.base_url);
        debug!(tool = %tool, url = %url, "Calling tool endpoint");

        let response = self
            .client
            .post(&url)
            .json(&InvokeRequest { tool, input })
            .send()
            .await
            .map_err(|e| EndpointError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EndpointError::Malformed(e.to_string()))?;

        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(EndpointError::Failed(message));
        }

        match body.get("output") {
            Some(output) => Ok(output.clone()),
            None => Err(EndpointError::Malformed("missing 'output' field".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Json, http::StatusCode, routing::get, routing::post, Router};
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn invoke_handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        match body["tool"].as_str() {
            Some("list_files") => (
                StatusCode::OK,
                Json(json!({"output": ["a.txt", "b.txt"], "seen": body["input"]})),
            ),
            Some("read_file") => (
                StatusCode::OK,
                Json(json!({"error": "[Errno 2] No such file or directory: '/nope'"})),
            ),
            Some("broken") => (StatusCode::OK, Json(json!({"status": "??"}))),
            _ => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": "bad input"})),
            ),
        }
    }

    fn stub_app() -> Router {
        Router::new()
            .route("/invoke", post(invoke_handler))
            .route(
                "/schema",
                get(|| async { Json(json!({"tools": [{"name": "list_files"}, {"name": "read_file"}]})) }),
            )
    }

    #[tokio::test]
    async fn test_call_returns_output() {
        let endpoint = HttpToolEndpoint::new(&serve(stub_app()).await);
        let output = endpoint
            .call("list_files", &json!({"directory": "/tmp"}))
            .await
            .unwrap();
        assert_eq!(output, json!(["a.txt", "b.txt"]));
    }

    #[tokio::test]
    async fn test_call_in_band_error() {
        let endpoint = HttpToolEndpoint::new(&serve(stub_app()).await);
        let err = endpoint
            .call("read_file", &json!({"file_path": "/nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Failed(ref m) if m.contains("No such file")));
    }

    #[tokio::test]
    async fn test_call_rejected_status() {
        let endpoint = HttpToolEndpoint::new(&serve(stub_app()).await);
        let err = endpoint.call("mystery", &json!({})).await.unwrap_err();
        assert!(matches!(err, EndpointError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_call_malformed_reply() {
        let endpoint = HttpToolEndpoint::new(&serve(stub_app()).await);
        let err = endpoint.call("broken", &json!({})).await.unwrap_err();
        assert!(matches!(err, EndpointError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_call_connection_refused() {
        // Grab a free port, then release it so nothing is listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = HttpToolEndpoint::new(&format!("http://{}", addr));
        let err = endpoint.call("list_files", &json!({})).await.unwrap_err();
        assert!(matches!(err, EndpointError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_fetch_schema() {
        let endpoint = HttpToolEndpoint::new(&serve(stub_app()).await);
        let names = endpoint.fetch_schema(Duration::from_secs(5)).await.unwrap();
        assert_eq!(names, vec!["list_files", "read_file"]);
    }

    #[tokio::test]
    async fn test_fetch_schema_gives_up_on_silent_server() {
        let app = Router::new().route(
            "/schema",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({"tools": []}))
            }),
        );
        let endpoint = HttpToolEndpoint::new(&serve(app).await);

        let err = endpoint
            .fetch_schema(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EndpointError::Unreachable(ref m) if m.contains("no answer")));
    }

    #[test]
    fn test_error_display() {
        let err = EndpointError::Rejected {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "responded with 500: boom");

        let err: Box<dyn std::error::Error> =
            Box::new(EndpointError::Unreachable("connection refused".into()));
        assert_eq!(err.to_string(), "unreachable: connection refused");
        assert_eq!(
            EndpointError::Malformed("not json".into()).to_string(),
            "malformed response: not json"
        );
    }
}
