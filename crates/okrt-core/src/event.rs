//! The canonical event model: the one ordered output surface of the engine.

use okrt_wire::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One canonical event, serialized as a newline-delimited `{type, data?}`
/// JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text, in source order.
    Content(String),
    /// Latched announcement that tool payloads are being assembled; exactly
    /// one per session, always before any `actions`.
    PreparingActions,
    /// The full deduplicated action batch accumulated so far — a replacement
    /// snapshot, never a delta.
    Actions(Vec<Value>),
    /// One validated chart payload; emitted once per unique chart.
    Chart(Value),
    /// The validated info-request payload; at most one per session.
    ReqMoreInfo(Value),
    /// Token accounting, emitted once immediately before `done`.
    Usage(TokenUsage),
    /// Terminal marker: exactly one per session, always last.
    Done,
}

impl StreamEvent {
    /// Serializes the event to one NDJSON line (without the newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an event from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_wire_shape() {
        let json = StreamEvent::Content("Hi".to_string()).to_json().unwrap();
        assert_eq!(json, r#"{"type":"content","data":"Hi"}"#);
    }

    #[test]
    fn test_done_has_no_data_field() {
        let json = StreamEvent::Done.to_json().unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
        let json = StreamEvent::PreparingActions.to_json().unwrap();
        assert_eq!(json, r#"{"type":"preparing_actions"}"#);
    }

    #[test]
    fn test_usage_wire_shape() {
        let json = StreamEvent::Usage(TokenUsage {
            input_tokens: 3,
            output_tokens: 7,
        })
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"usage","data":{"inputTokens":3,"outputTokens":7}}"#);
    }

    #[test]
    fn test_round_trip() {
        let event = StreamEvent::Actions(vec![serde_json::json!({"op":"create"})]);
        let parsed = StreamEvent::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_req_more_info_tag() {
        let event = StreamEvent::ReqMoreInfo(serde_json::json!({"objective":{}}));
        assert!(event.to_json().unwrap().starts_with(r#"{"type":"req_more_info""#));
    }
}
