//! okrt-core - Session engine and canonical event model for streamed
//! OKR-tool responses

pub mod audit;
pub mod buffer;
pub mod config;
pub mod dedup;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod payload;
pub mod session;

pub use audit::{
    InteractionCapture, InteractionRecorder, JsonlRecorder, NullRecorder, RequestDescriptor,
    ResponseDescriptor,
};
pub use buffer::{DrainedCall, ToolCallBuffer, ToolCallBuffers};
pub use config::{Config, ConfigError};
pub use dedup::canonical_key;
pub use emitter::EventEmitter;
pub use engine::StreamEngine;
pub use error::EngineError;
pub use event::StreamEvent;
pub use payload::{extract, ParsedPayload, PayloadError, ToolKind, ToolRegistry};
pub use session::{PayloadBatch, RawCapture, SessionState, DEFAULT_RAW_CAPTURE_LIMIT};
