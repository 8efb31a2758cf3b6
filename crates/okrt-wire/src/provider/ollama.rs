//! Adapter and connector for the newline-delimited JSON protocol
//! (Ollama-style chat records, one object per line).
//!
//! Tool calls in this family arrive as complete objects, so every invocation
//! takes the seeded fast path and flushes in the same record. The `done`
//! record carries token counts and terminates the stream.

use super::{
    byte_stream, check_status, ByteStream, ChatRequest, ProviderAdapter, ProviderError,
    ProviderEvent, TokenUsage,
};
use crate::frame::{Framing, RawFrame};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

/// The base URL for a local Ollama daemon.
pub const OLLAMA_API_BASE: &str = "http://localhost:11434";

#[derive(Debug, Deserialize)]
struct ChatRecord {
    message: Option<MessageRecord>,
    done: Option<bool>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallRecord>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallRecord {
    function: FunctionRecord,
}

#[derive(Debug, Deserialize)]
struct FunctionRecord {
    name: String,
    /// Arguments arrive as a complete JSON object, never fragmented.
    arguments: Value,
}

/// Stateless mapper for the newline-delimited protocol.
#[derive(Debug, Default)]
pub struct OllamaAdapter {
    calls_seen: u64,
}

impl OllamaAdapter {
    /// Creates a fresh per-session adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProviderAdapter for OllamaAdapter {
    fn framing(&self) -> Framing {
        Framing::JsonLines
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }

    fn on_frame(&mut self, frame: RawFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let data = match frame {
            RawFrame::Done => return Ok(vec![ProviderEvent::Finished]),
            RawFrame::Record { data, .. } => data,
        };

        let record: ChatRecord = serde_json::from_str(&data)?;
        if let Some(message) = record.error {
            return Ok(vec![ProviderEvent::UpstreamError(message)]);
        }

        let mut events = Vec::new();
        if let Some(message) = record.message {
            if let Some(content) = message.content {
                if !content.is_empty() {
                    events.push(ProviderEvent::Content(content));
                }
            }
            if let Some(tool_calls) = message.tool_calls {
                let had_calls = !tool_calls.is_empty();
                for call in tool_calls {
                    self.calls_seen += 1;
                    events.push(ProviderEvent::ToolStart {
                        id: format!("ollama_call_{}", self.calls_seen),
                        name: Some(call.function.name),
                        seed: Some(serde_json::to_string(&call.function.arguments)?),
                    });
                }
                if had_calls {
                    events.push(ProviderEvent::Flush);
                }
            }
        }
        if record.done == Some(true) {
            events.push(ProviderEvent::Usage(TokenUsage {
                input_tokens: record.prompt_eval_count.unwrap_or(0),
                output_tokens: record.eval_count.unwrap_or(0),
            }));
            events.push(ProviderEvent::Finished);
        }
        Ok(events)
    }
}

/// HTTP connector for the Ollama chat API.
#[derive(Debug, Clone)]
pub struct OllamaConnector {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaConnector {
    /// Creates a new connector for the given model.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(model: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            model: model.into(),
            base_url: OLLAMA_API_BASE.to_string(),
        })
    }

    /// Overrides the daemon base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for m in &request.messages {
            messages.push(serde_json::json!({"role": m.role, "content": m.content}));
        }
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        })
    }

    /// Opens the upstream byte stream for one request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on a non-success status.
    pub async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&self.build_body(request))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(byte_stream(response.bytes_stream()))
    }
}
