//! Structural identity for JSON payloads.
//!
//! Two payloads are duplicates when their canonical serializations are
//! identical; serde_json's map keys are ordered, so `to_string` is canonical
//! here. [`crate::session::PayloadBatch`] and the chart latch both key their
//! seen-sets on this.

use serde_json::Value;

/// The canonical hash key for a payload.
pub fn canonical_key(value: &Value) -> String {
    // Infallible for Value trees.
    serde_json::to_string(value).unwrap_or_default()
}
