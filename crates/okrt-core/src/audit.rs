//! Interaction auditing.
//!
//! After each session the engine hands a capture of the request shape and
//! the (bounded) raw response body to a recorder. Recording is best-effort
//! and must never affect the event stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What was asked of the provider, without message bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub model: String,
    pub message_count: usize,
}

/// What came back, bounded and lossily decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDescriptor {
    pub body: String,
    pub truncated: bool,
    pub captured_at: DateTime<Utc>,
}

/// One complete request/response capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionCapture {
    pub provider: String,
    pub request: RequestDescriptor,
    pub response: ResponseDescriptor,
}

/// Sink for interaction captures.
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    /// Records one capture. Failures are logged by the caller and dropped.
    async fn record(&self, capture: InteractionCapture) -> std::io::Result<()>;
}

/// Discards every capture.
#[derive(Debug, Default)]
pub struct NullRecorder;

#[async_trait]
impl InteractionRecorder for NullRecorder {
    async fn record(&self, _capture: InteractionCapture) -> std::io::Result<()> {
        Ok(())
    }
}

/// Appends one JSON line per capture to a file.
#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
}

impl JsonlRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InteractionRecorder for JsonlRecorder {
    async fn record(&self, capture: InteractionCapture) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut line = serde_json::to_string(&capture)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> InteractionCapture {
        InteractionCapture {
            provider: "anthropic".to_string(),
            request: RequestDescriptor {
                model: "test-model".to_string(),
                message_count: 2,
            },
            response: ResponseDescriptor {
                body: "data: {}\n\n".to_string(),
                truncated: false,
                captured_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_jsonl_recorder_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let recorder = JsonlRecorder::new(&path);
        recorder.record(capture()).await.unwrap();
        recorder.record(capture()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: InteractionCapture = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.provider, "anthropic");
        assert_eq!(parsed.request.message_count, 2);
    }

    #[tokio::test]
    async fn test_null_recorder_accepts_everything() {
        NullRecorder.record(capture()).await.unwrap();
    }
}
