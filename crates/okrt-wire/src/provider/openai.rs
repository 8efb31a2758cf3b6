//! Adapter and connector for the event-tagged variant-B protocol
//! (OpenAI-style data-only SSE `chat.completion.chunk` frames).
//!
//! Tool-call fragments arrive as `choices[].delta.tool_calls[]` entries
//! carrying a positional `index` and, on the first fragment, an `id`. The id
//! takes precedence; the index only resolves a buffer opened before its id
//! was known. A single conceptual content delta can surface through both the
//! current `delta.content` shape and the legacy `text` completion shape kept
//! for backward compatibility — it is forwarded exactly once.

use super::{
    byte_stream, check_status, ByteStream, ChatRequest, ProviderAdapter, ProviderError,
    ProviderEvent, TokenUsage,
};
use crate::frame::{Framing, RawFrame};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// The base URL for the OpenAI API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// A chunk from the streaming response.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<UsageRecord>,
    error: Option<ErrorBody>,
}

/// A choice within a stream chunk.
#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    /// Legacy completions shape; mirrors `delta.content` on relays that
    /// emit both.
    text: Option<String>,
    finish_reason: Option<String>,
}

/// The delta content within a choice.
#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// One fragment of a streamed tool call.
#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageRecord {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stateful mapper for the variant-B event-tagged protocol.
#[derive(Debug, Default)]
pub struct OpenAiAdapter {
    /// Positional index to invocation id, for fragments after the first.
    index_ids: HashMap<u32, String>,
    /// Invocation ids already announced with a ToolStart.
    started: HashSet<String>,
}

impl OpenAiAdapter {
    /// Creates a fresh per-session adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a fragment to its invocation id. Id wins when present; the
    /// index is a fallback for fragments that arrive before the id is known.
    fn resolve_id(&mut self, delta: &ToolCallDelta) -> String {
        match &delta.id {
            Some(id) => {
                if let Some(known) = self.index_ids.get(&delta.index) {
                    if known != id {
                        // Provider-compliance assumption: log, follow the id.
                        warn!(index = delta.index, known, id, "tool-call id and index disagree; id wins");
                    }
                }
                self.index_ids.insert(delta.index, id.clone());
                id.clone()
            }
            None => match self.index_ids.get(&delta.index) {
                Some(id) => id.clone(),
                None => {
                    warn!(index = delta.index, "tool-call fragment before any id; synthesizing");
                    let id = format!("call_{}", delta.index);
                    self.index_ids.insert(delta.index, id.clone());
                    id
                }
            },
        }
    }

    fn on_tool_delta(&mut self, delta: &ToolCallDelta, events: &mut Vec<ProviderEvent>) {
        let id = self.resolve_id(delta);
        let name = delta.function.as_ref().and_then(|f| f.name.clone());
        if self.started.insert(id.clone()) {
            events.push(ProviderEvent::ToolStart {
                id: id.clone(),
                name: name.clone(),
                seed: None,
            });
        } else if let Some(name) = name {
            events.push(ProviderEvent::ToolName {
                id: id.clone(),
                name,
            });
        }
        if let Some(arguments) = delta.function.as_ref().and_then(|f| f.arguments.clone()) {
            if !arguments.is_empty() {
                events.push(ProviderEvent::ToolFragment { id, fragment: arguments });
            }
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn framing(&self) -> Framing {
        Framing::EventStream
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn on_frame(&mut self, frame: RawFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let data = match frame {
            RawFrame::Done => return Ok(vec![ProviderEvent::Finished]),
            RawFrame::Record { data, .. } => data,
        };

        let chunk: ChatChunk = serde_json::from_str(&data)?;
        if let Some(error) = chunk.error {
            let message = error.message.unwrap_or_else(|| "upstream error".to_string());
            return Ok(vec![ProviderEvent::UpstreamError(message)]);
        }

        let mut events = Vec::new();
        for choice in &chunk.choices {
            // Forward one conceptual content delta exactly once: the current
            // delta.content shape wins over the legacy text shape.
            let content = choice
                .delta
                .as_ref()
                .and_then(|d| d.content.as_ref())
                .or(choice.text.as_ref());
            if let Some(text) = content {
                if !text.is_empty() {
                    events.push(ProviderEvent::Content(text.clone()));
                }
            }
            if let Some(tool_calls) = choice.delta.as_ref().and_then(|d| d.tool_calls.as_ref()) {
                for delta in tool_calls {
                    self.on_tool_delta(delta, &mut events);
                }
            }
            if choice.finish_reason.is_some() {
                events.push(ProviderEvent::Flush);
            }
        }
        if let Some(usage) = chunk.usage {
            events.push(ProviderEvent::Usage(TokenUsage {
                input_tokens: usage.prompt_tokens.unwrap_or(0),
                output_tokens: usage.completion_tokens.unwrap_or(0),
            }));
        }
        Ok(events)
    }
}

/// HTTP connector for OpenAI-compatible chat-completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiConnector {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiConnector {
    /// Creates a new connector with the given API key and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new<S: Into<String>>(api_key: S, model: S) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL (Azure, LocalAI, compatible endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ProviderError::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
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
            "stream_options": {"include_usage": true},
        })
    }

    /// Opens the upstream byte stream for one request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on a non-success status.
    pub async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&self.build_body(request))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(byte_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &str) -> RawFrame {
        RawFrame::Record {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_content_delta() {
        let mut adapter = OpenAiAdapter::new();
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#,
            ))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Content("Hello".to_string())]);
    }

    #[test]
    fn test_overlapping_content_shapes_forward_once() {
        let mut adapter = OpenAiAdapter::new();
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"content":"Hi"},"text":"Hi","finish_reason":null}]}"#,
            ))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Content("Hi".to_string())]);

        // Legacy shape alone still forwards.
        let events = adapter
            .on_frame(frame(r#"{"choices":[{"text":"legacy","finish_reason":null}]}"#))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Content("legacy".to_string())]);
    }

    #[test]
    fn test_tool_call_fragments_resolve_by_index_after_first_id() {
        let mut adapter = OpenAiAdapter::new();
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"emit_okrt_actions","arguments":""}}]}}]}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::ToolStart {
                id: "call_a".to_string(),
                name: Some("emit_okrt_actions".to_string()),
                seed: None,
            }]
        );

        // Later fragments carry only the index.
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"actions\":[]}"}}]}}]}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::ToolFragment {
                id: "call_a".to_string(),
                fragment: "{\"actions\":[]}".to_string(),
            }]
        );
    }

    #[test]
    fn test_id_wins_over_conflicting_index() {
        let mut adapter = OpenAiAdapter::new();
        adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"render_chart"}}]}}]}"#,
            ))
            .unwrap();
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_b","function":{"arguments":"{}"}}]}}]}"#,
            ))
            .unwrap();
        // A new id at a known index opens a new invocation under that id.
        assert_eq!(
            events,
            vec![
                ProviderEvent::ToolStart {
                    id: "call_b".to_string(),
                    name: None,
                    seed: None,
                },
                ProviderEvent::ToolFragment {
                    id: "call_b".to_string(),
                    fragment: "{}".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_late_name_binding() {
        let mut adapter = OpenAiAdapter::new();
        adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"arguments":"{"}}]}}]}"#,
            ))
            .unwrap();
        let events = adapter
            .on_frame(frame(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"request_more_info"}}]}}]}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::ToolName {
                id: "call_a".to_string(),
                name: "request_more_info".to_string(),
            }]
        );
    }

    #[test]
    fn test_finish_reason_flushes_and_usage_reported() {
        let mut adapter = OpenAiAdapter::new();
        let events = adapter
            .on_frame(frame(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Flush]);

        let events = adapter
            .on_frame(frame(
                r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":11}}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::Usage(TokenUsage {
                input_tokens: 5,
                output_tokens: 11,
            })]
        );

        let events = adapter.on_frame(RawFrame::Done).unwrap();
        assert_eq!(events, vec![ProviderEvent::Finished]);
    }

    #[test]
    fn test_build_body_requests_usage() {
        let connector = OpenAiConnector::new("k", "gpt-4o-mini").unwrap();
        let body = connector.build_body(&ChatRequest::from_prompt("Hi"));
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }
}
