//! # okrt-wire
//!
//! Provider wire protocols for the okrt streaming normalization engine.
//!
//! This crate turns the raw byte streams of four incompatible LLM streaming
//! protocols into one normalized sequence of [`ProviderEvent`] values:
//!
//! - **Frame decoding** ([`frame`]) — chunk-boundary-safe decoders for the
//!   three framing families: event-tagged SSE, newline-delimited JSON, and
//!   self-delimited JSON objects with no external framing.
//! - **Provider adapters** ([`provider`]) — stateful per-session mappers from
//!   decoded frames to normalized events, one per provider family.
//! - **Connectors** — thin HTTP clients that open the upstream byte stream
//!   for each provider.
//!
//! ## Example
//!
//! ```rust
//! use okrt_wire::frame::{FrameDecoder, Framing, RawFrame};
//! use okrt_wire::provider::{anthropic::AnthropicAdapter, ProviderAdapter};
//!
//! let mut adapter = AnthropicAdapter::new();
//! let mut decoder = FrameDecoder::for_framing(adapter.framing());
//!
//! for frame in decoder.push("event: ping\ndata: {\"type\":\"ping\"}\n\n") {
//!     let events = adapter.on_frame(frame).unwrap();
//!     assert!(events.is_empty()); // pings carry nothing
//! }
//! ```

pub mod frame;
pub mod provider;

// Re-export main types for convenience
pub use frame::{FrameDecodeError, FrameDecoder, Framing, RawFrame, Utf8Carry};
pub use provider::{
    ByteStream, ChatMessage, ChatRequest, ProviderAdapter, ProviderError, ProviderEvent,
    ProviderKind, Role, TokenUsage,
};
pub use provider::anthropic::{AnthropicAdapter, AnthropicConnector};
pub use provider::gemini::{GeminiAdapter, GeminiConnector};
pub use provider::ollama::{OllamaAdapter, OllamaConnector};
pub use provider::openai::{OpenAiAdapter, OpenAiConnector};
