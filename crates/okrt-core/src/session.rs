//! Per-session working state.
//!
//! One [`SessionState`] lives for the duration of a single streamed
//! response. It accumulates tool-call fragments, the growing action batch,
//! chart and info-request latches, the latest usage totals, and a bounded
//! copy of the raw upstream bytes for auditing.

use crate::buffer::ToolCallBuffers;
use crate::dedup::canonical_key;
use okrt_wire::TokenUsage;
use serde_json::Value;
use std::collections::HashSet;

/// The cumulative, deduplicated action batch.
///
/// Items keep first-arrival order. Structural duplicates (same canonical
/// serialization) are dropped on insert, so every emitted snapshot is
/// already dedup'd.
#[derive(Debug, Default)]
pub struct PayloadBatch {
    items: Vec<Value>,
    seen: HashSet<String>,
}

impl PayloadBatch {
    /// Appends one action unless a structurally equal one is already held.
    pub fn push(&mut self, item: Value) {
        if self.seen.insert(canonical_key(&item)) {
            self.items.push(item);
        }
    }

    /// Full snapshot of the batch so far.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Bounded capture of raw upstream bytes.
///
/// Keeps at most `limit` bytes of lossily decoded text and appends a
/// truncation marker once the limit is hit.
#[derive(Debug)]
pub struct RawCapture {
    buf: String,
    limit: usize,
    truncated: bool,
}

pub const DEFAULT_RAW_CAPTURE_LIMIT: usize = 200_000;

impl RawCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends a chunk, respecting the byte limit.
    pub fn append(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        let text = String::from_utf8_lossy(chunk);
        let remaining = self.limit.saturating_sub(self.buf.len());
        if text.len() <= remaining {
            self.buf.push_str(&text);
        } else {
            let mut cut = remaining;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.buf.push_str(&text[..cut]);
            self.buf.push_str("…[truncated]");
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_body(self) -> String {
        self.buf
    }
}

/// Everything the engine tracks across one streamed response.
#[derive(Debug)]
pub struct SessionState {
    /// Open tool-call buffers, keyed by provider call id.
    pub buffers: ToolCallBuffers,
    /// Cumulative deduplicated action batch.
    pub batch: PayloadBatch,
    /// Charts validated this round but not yet emitted.
    pub pending_charts: Vec<Value>,
    /// Canonical keys of every chart emitted so far.
    pub charts_seen: HashSet<String>,
    /// Info request validated this round, awaiting emission.
    pub pending_info: Option<Value>,
    /// Set after an invalid info request; blocks all later ones.
    pub info_poisoned: bool,
    /// The one-time content fallback for a rejected info request.
    pub info_fallback_sent: bool,
    /// Latest usage totals reported upstream, last report wins.
    pub usage: Option<TokenUsage>,
    /// Raw bytes of the upstream response, bounded.
    pub raw: RawCapture,
}

impl SessionState {
    pub fn new(raw_capture_limit: usize) -> Self {
        Self {
            buffers: ToolCallBuffers::default(),
            batch: PayloadBatch::default(),
            pending_charts: Vec::new(),
            charts_seen: HashSet::new(),
            pending_info: None,
            info_poisoned: false,
            info_fallback_sent: false,
            usage: None,
            raw: RawCapture::new(raw_capture_limit),
        }
    }

    /// Queues a chart for emission unless an identical one already went out.
    pub fn queue_chart(&mut self, chart: Value) {
        if self.charts_seen.insert(canonical_key(&chart)) {
            self.pending_charts.push(chart);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_dedup_keeps_first_order() {
        let mut batch = PayloadBatch::default();
        batch.push(json!({"op":"create","id":"a"}));
        batch.push(json!({"op":"update","id":"b"}));
        batch.push(json!({"id":"a","op":"create"}));
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.snapshot(),
            vec![json!({"op":"create","id":"a"}), json!({"op":"update","id":"b"})]
        );
    }

    #[test]
    fn test_batch_many_duplicates_collapse_to_one() {
        let mut batch = PayloadBatch::default();
        batch.push(json!({"op":"update","payload":{"title":"a"}}));
        for _ in 0..5 {
            batch.push(json!({"payload":{"title":"a"},"op":"update"}));
        }
        batch.push(json!({"op":"update","payload":{"title":"b"}}));
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.snapshot()[0],
            json!({"op":"update","payload":{"title":"a"}})
        );
    }

    #[test]
    fn test_chart_latch_one_per_unique_payload() {
        let mut state = SessionState::new(DEFAULT_RAW_CAPTURE_LIMIT);
        let chart = json!({"kind":"render_chart","chartType":"bar"});
        state.queue_chart(chart.clone());
        state.queue_chart(chart.clone());
        assert_eq!(state.pending_charts.len(), 1);
        state.pending_charts.clear();
        state.queue_chart(chart);
        assert!(state.pending_charts.is_empty());
        state.queue_chart(json!({"kind":"render_chart","chartType":"line"}));
        assert_eq!(state.pending_charts.len(), 1);
    }

    #[test]
    fn test_raw_capture_truncates_at_limit() {
        let mut raw = RawCapture::new(10);
        raw.append(b"0123456789abcdef");
        assert!(raw.is_truncated());
        let body = raw.into_body();
        assert!(body.starts_with("0123456789"));
        assert!(body.ends_with("…[truncated]"));
    }

    #[test]
    fn test_raw_capture_respects_char_boundaries() {
        let mut raw = RawCapture::new(5);
        raw.append("abcd\u{00e9}f".as_bytes());
        assert!(raw.is_truncated());
        let body = raw.into_body();
        assert!(body.starts_with("abcd"));
    }

    #[test]
    fn test_raw_capture_under_limit_untouched() {
        let mut raw = RawCapture::new(100);
        raw.append(b"hello ");
        raw.append(b"world");
        assert!(!raw.is_truncated());
        assert_eq!(raw.into_body(), "hello world");
    }
}
