//! The engine's error taxonomy.
//!
//! Every variant is logged where it occurs; none of them may prevent the
//! unconditional terminal `done` event.

use thiserror::Error;

/// Errors observed while driving one streaming session.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The upstream connection failed or timed out before a terminator.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed low-level framing at true end-of-stream.
    #[error("frame decode error: {0}")]
    FrameDecode(#[from] okrt_wire::FrameDecodeError),

    /// A tool's buffered argument text failed to parse at a flush point.
    #[error("argument parse error for tool {tool}: {source}")]
    ArgumentParse {
        /// The tool whose contribution is dropped.
        tool: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Parsed JSON does not match its declared payload kind.
    #[error("schema invalid for tool {tool}: {reason}")]
    SchemaInvalid {
        /// The tool whose payload was rejected.
        tool: String,
        /// What failed structurally.
        reason: String,
    },

    /// The provider reported an explicit error record mid-stream.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),
}
