//! The canonical event emitter: the single ordered output channel.
//!
//! The emitter owns the session's ordering invariants as an explicit state
//! machine (`idle → streaming → preparing → terminal`) with latches, so a
//! reviewer can audit them in one place rather than across the engine loop:
//!
//! - `preparing_actions` is emitted exactly once, never after the first
//!   `actions` event;
//! - `req_more_info` and `usage` are emitted at most once;
//! - `done` is emitted exactly once and nothing follows it.
//!
//! Events are written to a bounded mpsc channel; a dropped receiver means
//! the consumer stopped reading, and further sends are discarded quietly so
//! the engine can still run its best-effort final flush.

use crate::event::StreamEvent;
use okrt_wire::TokenUsage;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Emitter lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitterState {
    Idle,
    Streaming,
    Preparing,
    Terminal,
}

/// Enforces the canonical event ordering for one session.
#[derive(Debug)]
pub struct EventEmitter {
    tx: mpsc::Sender<StreamEvent>,
    state: EmitterState,
    preparing_sent: bool,
    actions_sent: bool,
    info_sent: bool,
    usage_sent: bool,
}

impl EventEmitter {
    /// Wraps a channel sender in a fresh emitter.
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx,
            state: EmitterState::Idle,
            preparing_sent: false,
            actions_sent: false,
            info_sent: false,
            usage_sent: false,
        }
    }

    /// True once `done` has been emitted.
    pub fn is_terminal(&self) -> bool {
        self.state == EmitterState::Terminal
    }

    async fn send(&self, event: StreamEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("consumer dropped; event discarded");
        }
    }

    /// Emits incremental text. Allowed while streaming or preparing.
    pub async fn content(&mut self, text: impl Into<String>) {
        if self.state == EmitterState::Terminal {
            warn!("content after done; dropped");
            return;
        }
        if self.state == EmitterState::Idle {
            self.state = EmitterState::Streaming;
        }
        self.send(StreamEvent::Content(text.into())).await;
    }

    /// Emits the one `preparing_actions` announcement, latched. A call after
    /// the first `actions` event is a no-op.
    pub async fn preparing(&mut self) {
        if self.state == EmitterState::Terminal {
            warn!("preparing_actions after done; dropped");
            return;
        }
        if self.preparing_sent || self.actions_sent {
            return;
        }
        self.preparing_sent = true;
        self.state = EmitterState::Preparing;
        self.send(StreamEvent::PreparingActions).await;
    }

    /// Emits a full batch snapshot, guaranteeing `preparing_actions` first.
    pub async fn actions(&mut self, batch: Vec<Value>) {
        if self.state == EmitterState::Terminal {
            warn!("actions after done; dropped");
            return;
        }
        if !self.preparing_sent {
            self.preparing().await;
        }
        self.actions_sent = true;
        self.send(StreamEvent::Actions(batch)).await;
    }

    /// Emits one validated chart payload.
    pub async fn chart(&mut self, chart: Value) {
        if self.state == EmitterState::Terminal {
            warn!("chart after done; dropped");
            return;
        }
        self.send(StreamEvent::Chart(chart)).await;
    }

    /// Emits the info-request payload, at most once per session.
    pub async fn req_more_info(&mut self, info: Value) {
        if self.state == EmitterState::Terminal {
            warn!("req_more_info after done; dropped");
            return;
        }
        if self.info_sent {
            warn!("req_more_info already sent this session; dropped");
            return;
        }
        self.info_sent = true;
        self.send(StreamEvent::ReqMoreInfo(info)).await;
    }

    /// Emits token accounting, at most once, immediately before `done`.
    pub async fn usage(&mut self, usage: TokenUsage) {
        if self.state == EmitterState::Terminal || self.usage_sent {
            return;
        }
        self.usage_sent = true;
        self.send(StreamEvent::Usage(usage)).await;
    }

    /// Emits the terminal `done`. Exactly one per session; everything after
    /// it is dropped.
    pub async fn done(&mut self) {
        if self.state == EmitterState::Terminal {
            warn!("duplicate done suppressed");
            return;
        }
        self.state = EmitterState::Terminal;
        self.send(StreamEvent::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> (EventEmitter, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (EventEmitter::new(tx), rx)
    }

    async fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn test_preparing_latches_once() {
        let (mut emitter, mut rx) = emitter();
        emitter.preparing().await;
        emitter.preparing().await;
        let events = drain(&mut rx).await;
        assert_eq!(events, vec![StreamEvent::PreparingActions]);
    }

    #[tokio::test]
    async fn test_preparing_never_follows_first_actions() {
        let (mut emitter, mut rx) = emitter();
        emitter.actions(vec![]).await;
        emitter.preparing().await;
        let events = drain(&mut rx).await;
        // actions() guarantees its own preparing; the late call is a no-op.
        assert_eq!(
            events,
            vec![StreamEvent::PreparingActions, StreamEvent::Actions(vec![])]
        );
    }

    #[tokio::test]
    async fn test_nothing_follows_done() {
        let (mut emitter, mut rx) = emitter();
        emitter.content("a").await;
        emitter.done().await;
        emitter.content("b").await;
        emitter.actions(vec![]).await;
        emitter.done().await;
        let events = drain(&mut rx).await;
        assert_eq!(
            events,
            vec![StreamEvent::Content("a".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_req_more_info_at_most_once() {
        let (mut emitter, mut rx) = emitter();
        emitter.req_more_info(serde_json::json!({"objective": {}})).await;
        emitter.req_more_info(serde_json::json!({"timeframe": {}})).await;
        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_panic() {
        let (mut emitter, rx) = emitter();
        drop(rx);
        emitter.content("lost").await;
        emitter.done().await;
        assert!(emitter.is_terminal());
    }
}
