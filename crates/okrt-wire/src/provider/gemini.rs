//! Adapter and connector for the self-delimited JSON protocol
//! (Gemini-style `streamGenerateContent` objects with no external framing).
//!
//! Records carry candidate parts: text parts stream content, function-call
//! parts deliver complete argument objects (seeded path, ids synthesized).
//! Older relays also mirror the concatenated part text into a legacy
//! top-level `text` field on the candidate; when structured parts are
//! present the legacy field is a duplicate and is not forwarded.

use super::{
    byte_stream, check_status, ByteStream, ChatRequest, ProviderAdapter, ProviderError,
    ProviderEvent, Role, TokenUsage,
};
use crate::frame::{Framing, RawFrame};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

/// The base URL for the Gemini API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRecord {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    /// Legacy aggregate of the part text; duplicate when parts are present.
    text: Option<String>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Mapper for the self-delimited JSON protocol.
#[derive(Debug, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    /// Creates a fresh per-session adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn framing(&self) -> Framing {
        Framing::JsonObjects
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn on_frame(&mut self, frame: RawFrame) -> Result<Vec<ProviderEvent>, ProviderError> {
        let data = match frame {
            RawFrame::Done => return Ok(vec![ProviderEvent::Finished]),
            RawFrame::Record { data, .. } => data,
        };

        let record: GenerateRecord = serde_json::from_str(&data)?;
        if let Some(error) = record.error {
            let message = error.message.unwrap_or_else(|| "upstream error".to_string());
            return Ok(vec![ProviderEvent::UpstreamError(message)]);
        }

        let mut events = Vec::new();
        if let Some(usage) = record.usage_metadata {
            events.push(ProviderEvent::Usage(TokenUsage {
                input_tokens: usage.prompt_token_count.unwrap_or(0),
                output_tokens: usage.candidates_token_count.unwrap_or(0),
            }));
        }

        let mut finished = false;
        for candidate in record.candidates.unwrap_or_default() {
            let parts = candidate
                .content
                .and_then(|c| c.parts)
                .unwrap_or_default();
            let mut saw_call = false;
            let had_parts = parts.iter().any(|p| p.text.is_some() || p.function_call.is_some());
            for part in parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        events.push(ProviderEvent::Content(text));
                    }
                }
                if let Some(call) = part.function_call {
                    let args = call.args.unwrap_or_else(|| Value::Object(Default::default()));
                    events.push(ProviderEvent::ToolStart {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: Some(call.name),
                        seed: Some(serde_json::to_string(&args)?),
                    });
                    saw_call = true;
                }
            }
            // Legacy aggregate field only counts when no structured parts came.
            if !had_parts {
                if let Some(text) = candidate.text {
                    if !text.is_empty() {
                        events.push(ProviderEvent::Content(text));
                    }
                }
            }
            if saw_call {
                events.push(ProviderEvent::Flush);
            }
            if candidate.finish_reason.is_some() {
                finished = true;
            }
        }
        if finished {
            events.push(ProviderEvent::Finished);
        }
        Ok(events)
    }
}

/// HTTP connector for the Gemini streaming API.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiConnector {
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
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut contents = Vec::new();
        for m in &request.messages {
            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{"text": m.content}],
            }));
        }
        let mut body = serde_json::json!({"contents": contents});
        if let Some(system) = &request.system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        body
    }

    /// Opens the upstream byte stream for one request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on a non-success status.
    pub async fn open(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}",
            self.base_url, self.model, self.api_key
        );
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
