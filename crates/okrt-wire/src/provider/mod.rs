//! Provider abstractions: the adapter trait, the normalized event union, and
//! the shared request/error types.
//!
//! An adapter is a thin, stateful mapper from one provider's decoded frames
//! onto the normalized [`ProviderEvent`] primitives. Adapters hold only the
//! per-session bookkeeping their protocol forces on them (index-to-id maps,
//! partial usage counters); argument buffering and payload validation belong
//! to the engine.

use crate::frame::{Framing, RawFrame};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

/// Errors from the provider layer.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// An error occurred while making the HTTP request.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A frame's payload could not be interpreted.
    #[error("Failed to parse record: {0}")]
    Parse(String),

    /// The API returned an error response before streaming began.
    #[error("API error: {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// An error occurred while serializing/deserializing JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An invalid configuration was provided.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// The upstream byte stream a connector opens.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the request.
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    /// Tokens produced by the response.
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
}

/// One normalized event mapped from a provider record.
///
/// This is the closed union every adapter dispatches into; the engine reacts
/// to these and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Incremental assistant text, in source order.
    Content(String),
    /// A tool invocation began. `seed` carries the serialized arguments when
    /// the provider delivered them atomically at start.
    ToolStart {
        /// Invocation id (provider-supplied or synthesized).
        id: String,
        /// Tool name, when known at start; may bind late.
        name: Option<String>,
        /// Complete serialized arguments, for the atomic delivery path.
        seed: Option<String>,
    },
    /// Late binding of a tool name to an in-flight invocation.
    ToolName {
        /// Invocation id.
        id: String,
        /// The tool name.
        name: String,
    },
    /// One fragment of argument text for an in-flight invocation.
    ToolFragment {
        /// Invocation id.
        id: String,
        /// The argument-text fragment, exactly as delivered.
        fragment: String,
    },
    /// A flush checkpoint: buffered tool arguments are complete enough to
    /// parse (block stop, finish reason, end of a tool-call batch).
    Flush,
    /// Token accounting; the latest report wins.
    Usage(TokenUsage),
    /// The provider reported an explicit error record.
    UpstreamError(String),
    /// The stream is over: explicit terminator or terminal record.
    Finished,
}

/// A stateful per-session mapper from decoded frames to normalized events.
pub trait ProviderAdapter: Send {
    /// The framing family this provider speaks.
    fn framing(&self) -> Framing;

    /// A stable name for logging and audit capture.
    fn provider_name(&self) -> &'static str;

    /// Maps one decoded frame onto zero or more normalized events.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Parse`] or [`ProviderError::Json`] when the
    /// record cannot be interpreted; the caller logs and continues with the
    /// next frame.
    fn on_frame(&mut self, frame: RawFrame) -> Result<Vec<ProviderEvent>, ProviderError>;
}

/// The four statically dispatched provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Event-tagged SSE, variant A (paired `event:`/`data:` lines).
    Anthropic,
    /// Event-tagged SSE, variant B (data-only lines).
    OpenAi,
    /// Newline-delimited JSON records.
    Ollama,
    /// Self-delimited JSON objects.
    Gemini,
}

impl ProviderKind {
    /// Returns the string form used in config and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Creates the adapter for this provider family.
    pub fn adapter(&self) -> Box<dyn ProviderAdapter> {
        match self {
            ProviderKind::Anthropic => Box::new(anthropic::AnthropicAdapter::new()),
            ProviderKind::OpenAi => Box::new(openai::OpenAiAdapter::new()),
            ProviderKind::Ollama => Box::new(ollama::OllamaAdapter::new()),
            ProviderKind::Gemini => Box::new(gemini::GeminiAdapter::new()),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ProviderError::Config(format!("unknown provider: {other}"))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// End-user input.
    User,
    /// Prior assistant output.
    Assistant,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the speaker.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The outbound request a connector turns into a provider call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The conversation history.
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Creates a single-turn request from one user prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::user(prompt)],
        }
    }
}

/// Maps a reqwest byte stream into a [`ByteStream`].
pub(crate) fn byte_stream(
    stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> ByteStream {
    use futures::StreamExt;
    Box::pin(stream.map(|result| result.map_err(ProviderError::Request)))
}

/// Fails the connector call when the response status is not success.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Api { status, message })
    }
}
