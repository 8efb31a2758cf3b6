//! Adapter and connector for the event-tagged variant-A protocol
//! (Anthropic-style paired `event:`/`data:` frames).
//!
//! Content arrives in indexed blocks: a `content_block_start` opens a text or
//! tool-use block, `content_block_delta` frames carry `text_delta` or
//! `input_json_delta` payloads, and `content_block_stop` closes the block —
//! the flush checkpoint for buffered tool arguments. Tool-use blocks that
//! open with a complete, non-empty `input` object take the seeded path.

use super::{
    byte_stream, check_status, ByteStream, ChatRequest, ProviderAdapter, ProviderError,
    ProviderEvent, TokenUsage,
};
use crate::frame::{Framing, RawFrame};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// The base URL for the Anthropic API.
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The closed set of frame kinds this protocol emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    MessageStart,
    ContentBlockStart,
    ContentBlockDelta,
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    Ping,
    Error,
    Unknown,
}

impl EventKind {
    fn parse(name: &str) -> Self {
        match name {
            "message_start" => Self::MessageStart,
            "content_block_start" => Self::ContentBlockStart,
            "content_block_delta" => Self::ContentBlockDelta,
            "content_block_stop" => Self::ContentBlockStop,
            "message_delta" => Self::MessageDelta,
            "message_stop" => Self::MessageStop,
            "ping" => Self::Ping,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockStartRecord {
    index: Option<usize>,
    content_block: Option<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<String>,
    name: Option<String>,
    text: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BlockDeltaRecord {
    index: Option<usize>,
    delta: Option<BlockDelta>,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockStopRecord {
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MessageStartRecord {
    message: Option<MessageMeta>,
}

#[derive(Debug, Deserialize)]
struct MessageMeta {
    usage: Option<UsageRecord>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaRecord {
    usage: Option<UsageRecord>,
}

#[derive(Debug, Deserialize)]
struct UsageRecord {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorRecord {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stateful mapper for the variant-A event-tagged protocol.
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    /// Content-block index to invocation id, for frames that carry no id.
    block_ids: HashMap<usize, String>,
    /// Indices known to be tool-use blocks (text blocks also get stop frames).
    tool_blocks: HashSet<usize>,
    usage: TokenUsage,
    saw_usage: bool,
}

impl AnthropicAdapter {
    /// Creates a fresh per-session adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn kind_of(frame_event: Option<&str>, data: &str) -> EventKind {
        if let Some(name) = frame_event {
            return EventKind::parse(name);
        }
        // Some relays drop the event: line; fall back to the payload tag.
        serde_json::from_str::<Value>(data)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(EventKind::parse))
            .unwrap_or(EventKind::Unknown)
    }

    fn merge_usage(&mut self, usage: Option<UsageRecord>) {
        if let Some(u) = usage {
            if let Some(input) = u.input_tokens {
                self.usage.input_tokens = input;
            }
            if let Some(output) = u.output_tokens {
                self.usage.output_tokens = output;
            }
            self.saw_usage = true;
        }
    }

    fn on_block_start(&mut self, data: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
        let record: BlockStartRecord = serde_json::from_str(data)?;
        let Some(block) = record.content_block else {
            return Ok(Vec::new());
        };
        match block.kind.as_deref() {
            Some("tool_use") => {
                let index = record.index.unwrap_or(0);
                let id = block
                    .id
                    .unwrap_or_else(|| format!("block_{index}"));
                self.block_ids.insert(index, id.clone());
                self.tool_blocks.insert(index);
                // A complete, non-empty input object at start seeds the buffer.
                let seed = match block.input {
                    Some(Value::Object(map)) if !map.is_empty() => {
                        Some(serde_json::to_string(&Value::Object(map))?)
                    }
                    _ => None,
                };
                Ok(vec![ProviderEvent::ToolStart {
                    id,
                    name: block.name,
                    seed,
                }])
            }
            _ => {
                // Text blocks may open with initial text.
                match block.text {
                    Some(text) if !text.is_empty() => Ok(vec![ProviderEvent::Content(text)]),
                    _ => Ok(Vec::new()),
                }
            }
        }
    }

    fn on_block_delta(&mut self, data: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
        let record: BlockDeltaRecord = serde_json::from_str(data)?;
        let Some(delta) = record.delta else {
            return Ok(Vec::new());
        };
        if let Some(text) = delta.text {
            return Ok(vec![ProviderEvent::Content(text)]);
        }
        if let Some(fragment) = delta.partial_json {
            let Some(index) = record.index else {
                warn!("input_json_delta without an index; fragment dropped");
                return Ok(Vec::new());
            };
            let Some(id) = self.block_ids.get(&index) else {
                warn!(index, "input_json_delta for an unopened block; fragment dropped");
                return Ok(Vec::new());
            };
            return Ok(vec![ProviderEvent::ToolFragment {
                id: id.clone(),
                fragment,
            }]);
        }
        Ok(Vec::new())
    }

    fn on_block_stop(&mut self, data: &str) -> Result<Vec<ProviderEvent>, ProviderError> {
        let record: BlockStopRecord = serde_json::from_str(data)?;
        let index = record.index.unwrap_or(0);
        self.block_ids.remove(&index);
        if self.tool_blocks.remove(&index) {
            Ok(vec![ProviderEvent::Flush])
        } else {
            Ok(Vec::new())
        }
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn framing(&self) -> Framing {
        Framing::EventStream
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn on_frame(&mut self, frame: RawFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let (event, data) = match frame {
            RawFrame::Done => return Ok(vec![ProviderEvent::Finished]),
            RawFrame::Record { event, data } => (event, data),
        };

        match Self::kind_of(event.as_deref(), &data) {
            EventKind::MessageStart => {
                let record: MessageStartRecord = serde_json::from_str(&data)?;
                self.merge_usage(record.message.and_then(|m| m.usage));
                Ok(Vec::new())
            }
            EventKind::ContentBlockStart => self.on_block_start(&data),
            EventKind::ContentBlockDelta => self.on_block_delta(&data),
            EventKind::ContentBlockStop => self.on_block_stop(&data),
            EventKind::MessageDelta => {
                let record: MessageDeltaRecord = serde_json::from_str(&data)?;
                self.merge_usage(record.usage);
                if self.saw_usage {
                    Ok(vec![ProviderEvent::Usage(self.usage)])
                } else {
                    Ok(Vec::new())
                }
            }
            EventKind::MessageStop => {
                let mut events = Vec::new();
                if self.saw_usage {
                    events.push(ProviderEvent::Usage(self.usage));
                }
                events.push(ProviderEvent::Finished);
                Ok(events)
            }
            EventKind::Ping => Ok(Vec::new()),
            EventKind::Error => {
                let record: ErrorRecord = serde_json::from_str(&data)?;
                let message = record
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "upstream error".to_string());
                Ok(vec![ProviderEvent::UpstreamError(message)])
            }
            EventKind::Unknown => {
                debug!(?event, "unrecognized frame; skipped");
                Ok(Vec::new())
            }
        }
    }
}

/// HTTP connector for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicConnector {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicConnector {
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
            base_url: ANTHROPIC_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL (proxies, compatible endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| ProviderError::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "stream": true,
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = system.clone().into();
        }
        body
    }

    /// Opens the upstream byte stream for one request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on a non-success status.
    pub async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError> {
        let url = format!("{}/messages", self.base_url);
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

    fn frame(event: &str, data: &str) -> RawFrame {
        RawFrame::Record {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_text_delta_becomes_content() {
        let mut adapter = AnthropicAdapter::new();
        let events = adapter
            .on_frame(frame("content_block_delta", r#"{"delta":{"text":"Hi"}}"#))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Content("Hi".to_string())]);
    }

    #[test]
    fn test_tool_block_lifecycle() {
        let mut adapter = AnthropicAdapter::new();
        let events = adapter
            .on_frame(frame(
                "content_block_start",
                r#"{"index":1,"content_block":{"type":"tool_use","id":"t1","name":"emit_okrt_actions","input":{}}}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::ToolStart {
                id: "t1".to_string(),
                name: Some("emit_okrt_actions".to_string()),
                seed: None,
            }]
        );

        let events = adapter
            .on_frame(frame(
                "content_block_delta",
                r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![ProviderEvent::ToolFragment {
                id: "t1".to_string(),
                fragment: "{\"a\":".to_string(),
            }]
        );

        let events = adapter
            .on_frame(frame("content_block_stop", r#"{"index":1}"#))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::Flush]);
    }

    #[test]
    fn test_non_empty_input_seeds() {
        let mut adapter = AnthropicAdapter::new();
        let events = adapter
            .on_frame(frame(
                "content_block_start",
                r#"{"index":0,"content_block":{"type":"tool_use","id":"t2","name":"render_chart","input":{"kind":"render_chart"}}}"#,
            ))
            .unwrap();
        match &events[0] {
            ProviderEvent::ToolStart { seed: Some(seed), .. } => {
                assert_eq!(seed, r#"{"kind":"render_chart"}"#);
            }
            other => panic!("expected seeded ToolStart, got {other:?}"),
        }
    }

    #[test]
    fn test_text_block_stop_is_not_a_flush() {
        let mut adapter = AnthropicAdapter::new();
        adapter
            .on_frame(frame(
                "content_block_start",
                r#"{"index":0,"content_block":{"type":"text","text":""}}"#,
            ))
            .unwrap();
        let events = adapter
            .on_frame(frame("content_block_stop", r#"{"index":0}"#))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_usage_then_finished_on_message_stop() {
        let mut adapter = AnthropicAdapter::new();
        adapter
            .on_frame(frame(
                "message_start",
                r#"{"type":"message_start","message":{"usage":{"input_tokens":9,"output_tokens":1}}}"#,
            ))
            .unwrap();
        adapter
            .on_frame(frame(
                "message_delta",
                r#"{"type":"message_delta","usage":{"output_tokens":17}}"#,
            ))
            .unwrap();
        let events = adapter
            .on_frame(frame("message_stop", r#"{"type":"message_stop"}"#))
            .unwrap();
        assert_eq!(
            events,
            vec![
                ProviderEvent::Usage(TokenUsage {
                    input_tokens: 9,
                    output_tokens: 17,
                }),
                ProviderEvent::Finished,
            ]
        );
    }

    #[test]
    fn test_error_record() {
        let mut adapter = AnthropicAdapter::new();
        let events = adapter
            .on_frame(frame(
                "error",
                r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
            ))
            .unwrap();
        assert_eq!(events, vec![ProviderEvent::UpstreamError("busy".to_string())]);
    }

    #[test]
    fn test_build_body() {
        let connector = AnthropicConnector::new("k", "claude-sonnet-4-20250514").unwrap();
        let mut request = ChatRequest::from_prompt("Hello");
        request.system = Some("Be brief".to_string());
        let body = connector.build_body(&request);
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
