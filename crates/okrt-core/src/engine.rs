//! The session engine.
//!
//! [`StreamEngine::run_session`] drives one streamed provider response end
//! to end: raw bytes are framed, frames are mapped by the adapter into
//! normalized provider events, and those events flow through the ordering
//! gate into canonical [`StreamEvent`]s on an output channel. All mutable
//! state lives in one [`SessionState`] owned by the session task, so
//! concurrent sessions cannot observe each other.

use crate::audit::{InteractionCapture, InteractionRecorder, RequestDescriptor, ResponseDescriptor};
use crate::emitter::EventEmitter;
use crate::error::EngineError;
use crate::event::StreamEvent;
use crate::payload::{extract, ParsedPayload, PayloadError, ToolKind, ToolRegistry};
use crate::session::{SessionState, DEFAULT_RAW_CAPTURE_LIMIT};
use chrono::Utc;
use futures::StreamExt;
use okrt_wire::{ByteStream, FrameDecoder, ProviderAdapter, ProviderEvent, Utf8Carry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Shown once when an info request arrives malformed.
const INFO_FALLBACK: &str =
    "I need more detail to continue, but I couldn't put the question together \
     properly. Could you say more about what you're trying to achieve?";

/// Whether the session keeps reading or is over.
enum Flow {
    Continue,
    Finished,
}

/// Orchestrates sessions. Cheap to clone per request.
#[derive(Clone)]
pub struct StreamEngine {
    registry: Arc<ToolRegistry>,
    recorder: Option<Arc<dyn InteractionRecorder>>,
    raw_capture_limit: usize,
}

impl StreamEngine {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            recorder: None,
            raw_capture_limit: DEFAULT_RAW_CAPTURE_LIMIT,
        }
    }

    /// Attaches an interaction recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn InteractionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Overrides the raw-capture byte limit.
    pub fn with_raw_capture_limit(mut self, limit: usize) -> Self {
        self.raw_capture_limit = limit;
        self
    }

    /// Runs one session to completion on a background task.
    ///
    /// The returned stream yields canonical events in order and always ends
    /// with `done`, whatever the upstream does.
    pub fn run_session(
        &self,
        adapter: Box<dyn ProviderAdapter>,
        request: RequestDescriptor,
        bytes: ByteStream,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(adapter, request, bytes, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(
        &self,
        mut adapter: Box<dyn ProviderAdapter>,
        request: RequestDescriptor,
        mut bytes: ByteStream,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let provider = adapter.provider_name();
        let mut state = SessionState::new(self.raw_capture_limit);
        let mut decoder = FrameDecoder::for_framing(adapter.framing());
        // A multi-byte character can be severed at any chunk boundary; the
        // carry holds the incomplete tail until its remaining bytes arrive.
        let mut utf8 = Utf8Carry::new();
        let mut emitter = EventEmitter::new(tx);

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let err = EngineError::Transport(e.to_string());
                    warn!(provider, error = %err, "finalizing session early");
                    break;
                }
            };
            state.raw.append(&chunk);
            let text = utf8.push(&chunk);
            for frame in decoder.push(&text) {
                match adapter.on_frame(frame) {
                    Ok(events) => {
                        for event in events {
                            if let Flow::Finished =
                                self.handle_event(event, &mut state, &mut emitter).await
                            {
                                break 'outer;
                            }
                        }
                    }
                    Err(e) => warn!(provider, error = %e, "unparseable frame skipped"),
                }
            }
        }

        // Flush whatever is still buffered: a dangling partial character,
        // an unterminated SSE frame, a partial trailing line.
        let mut trailing = decoder.push(&utf8.finish());
        match decoder.finish() {
            Ok(frames) => trailing.extend(frames),
            Err(e) => {
                let err = EngineError::FrameDecode(e);
                warn!(provider, error = %err, "stream ended mid-record");
            }
        }
        for frame in trailing {
            match adapter.on_frame(frame) {
                Ok(events) => {
                    for event in events {
                        if let Flow::Finished =
                            self.handle_event(event, &mut state, &mut emitter).await
                        {
                            break;
                        }
                    }
                }
                Err(e) => warn!(provider, error = %e, "unparseable trailing frame"),
            }
        }

        self.finalize(provider, request, state, &mut emitter).await;
    }

    async fn handle_event(
        &self,
        event: ProviderEvent,
        state: &mut SessionState,
        emitter: &mut EventEmitter,
    ) -> Flow {
        match event {
            ProviderEvent::Content(text) => emitter.content(text).await,
            ProviderEvent::ToolStart { id, name, seed } => {
                if let Some(name) = name.as_deref() {
                    if self.registry.kind_for(name).is_some() {
                        emitter.preparing().await;
                    }
                }
                state.buffers.begin(id, name, seed);
            }
            ProviderEvent::ToolName { id, name } => {
                if self.registry.kind_for(&name).is_some() {
                    emitter.preparing().await;
                }
                state.buffers.bind_name(&id, name);
            }
            ProviderEvent::ToolFragment { id, fragment } => {
                state.buffers.append(&id, fragment);
            }
            ProviderEvent::Flush => self.flush_tools(state, emitter).await,
            ProviderEvent::Usage(usage) => state.usage = Some(usage),
            ProviderEvent::UpstreamError(message) => {
                let err = EngineError::UpstreamProtocol(message);
                warn!(error = %err, "finalizing");
                return Flow::Finished;
            }
            ProviderEvent::Finished => return Flow::Finished,
        }
        Flow::Continue
    }

    /// Drains every open buffer, routes payloads, and emits what this round
    /// produced.
    async fn flush_tools(&self, state: &mut SessionState, emitter: &mut EventEmitter) {
        let mut batch_grew = false;
        for call in state.buffers.drain_all() {
            let Some(name) = call.name.as_deref() else {
                warn!(id = %call.id, "tool call closed without a name; dropped");
                continue;
            };
            let Some(kind) = self.registry.kind_for(name) else {
                debug!(tool = name, "unregistered tool payload ignored");
                continue;
            };
            match extract(kind, &call.arguments) {
                Ok(ParsedPayload::Actions(items)) => {
                    for item in items {
                        state.batch.push(item);
                    }
                    batch_grew = true;
                }
                Ok(ParsedPayload::Chart(chart)) => state.queue_chart(chart),
                Ok(ParsedPayload::InfoRequest(info)) => {
                    if !state.info_poisoned {
                        state.pending_info = Some(info);
                    }
                }
                Err(e) => self.reject_payload(kind, name, e, state, emitter).await,
            }
        }

        if batch_grew && !state.batch.is_empty() {
            emitter.actions(state.batch.snapshot()).await;
        }
        for chart in std::mem::take(&mut state.pending_charts) {
            emitter.chart(chart).await;
        }
        if let Some(info) = state.pending_info.take() {
            if !state.info_poisoned {
                emitter.req_more_info(info).await;
            }
        }
    }

    /// An invalid payload never aborts the session; the reaction depends on
    /// the kind. Info requests degrade to a one-time spoken fallback and
    /// poison the latch; charts are best-effort and vanish silently;
    /// action batches are loudly logged and skipped.
    async fn reject_payload(
        &self,
        kind: ToolKind,
        tool: &str,
        error: PayloadError,
        state: &mut SessionState,
        emitter: &mut EventEmitter,
    ) {
        let error = match error {
            PayloadError::Parse(source) => EngineError::ArgumentParse {
                tool: tool.to_string(),
                source,
            },
            PayloadError::SchemaInvalid(reason) => EngineError::SchemaInvalid {
                tool: tool.to_string(),
                reason,
            },
        };
        match kind {
            ToolKind::InfoRequest => {
                warn!(%error, "invalid info request; falling back to content");
                state.info_poisoned = true;
                state.pending_info = None;
                if !state.info_fallback_sent {
                    state.info_fallback_sent = true;
                    emitter.content(INFO_FALLBACK).await;
                }
            }
            ToolKind::Chart => debug!(%error, "invalid chart skipped"),
            ToolKind::ActionBatch => {
                warn!(%error, "no payload from this tool this round");
            }
        }
    }

    /// Runs once per session: the final flush, usage, `done`, and the audit
    /// capture. `done` goes out no matter what preceded it.
    async fn finalize(
        &self,
        provider: &'static str,
        request: RequestDescriptor,
        mut state: SessionState,
        emitter: &mut EventEmitter,
    ) {
        self.flush_tools(&mut state, emitter).await;
        if let Some(usage) = state.usage.take() {
            emitter.usage(usage).await;
        }
        emitter.done().await;

        if let Some(recorder) = &self.recorder {
            let truncated = state.raw.is_truncated();
            let capture = InteractionCapture {
                provider: provider.to_string(),
                request,
                response: ResponseDescriptor {
                    body: state.raw.into_body(),
                    truncated,
                    captured_at: Utc::now(),
                },
            };
            if let Err(e) = recorder.record(capture).await {
                warn!(error = %e, "interaction capture failed");
            }
        }
    }
}
