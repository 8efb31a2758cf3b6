//! Payload extraction and structural validation.
//!
//! Given a tool's name and its fully buffered argument text, this module
//! parses the text and validates it against the tool's declared payload
//! kind. The name-to-kind mapping is configuration, not hardcoded: the
//! [`ToolRegistry`] is supplied externally and defaults to the standard
//! three tools. Domain schemas beyond structure are an external contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// The three payload kinds a registered tool can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// A batch of create/update/delete actions for the downstream system.
    ActionBatch,
    /// A best-effort chart description.
    Chart,
    /// A request for more information from the user.
    InfoRequest,
}

/// The closed, externally supplied tool-name registry.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    map: HashMap<String, ToolKind>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert("emit_okrt_actions".to_string(), ToolKind::ActionBatch);
        map.insert("render_chart".to_string(), ToolKind::Chart);
        map.insert("request_more_info".to_string(), ToolKind::InfoRequest);
        Self { map }
    }
}

impl ToolRegistry {
    /// Builds a registry from explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ToolKind)>) -> Self {
        Self {
            map: entries.into_iter().collect(),
        }
    }

    /// Looks up the payload kind for a tool name.
    pub fn kind_for(&self, name: &str) -> Option<ToolKind> {
        self.map.get(name).copied()
    }
}

/// Why a payload was rejected.
#[derive(Error, Debug)]
pub enum PayloadError {
    /// The argument text is not valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The JSON parsed but does not match its declared kind.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),
}

/// A validated payload, routed by kind.
#[derive(Debug, PartialEq)]
pub enum ParsedPayload {
    /// Action objects, already reduced to a flat list.
    Actions(Vec<Value>),
    /// One validated chart object (original value, fields preserved).
    Chart(Value),
    /// One validated info-request object.
    InfoRequest(Value),
}

/// The closed chart-type set.
const CHART_TYPES: [&str; 5] = ["bar", "line", "area", "pie", "scatter"];
/// Structural bounds on chart payloads.
const MAX_SERIES: usize = 8;
const MAX_DATA_POINTS: usize = 1000;

/// Parses and validates one tool's complete argument text.
///
/// # Errors
///
/// [`PayloadError::Parse`] when the text is not JSON;
/// [`PayloadError::SchemaInvalid`] when it parses but fails the structural
/// rules of its kind.
pub fn extract(kind: ToolKind, arguments: &str) -> Result<ParsedPayload, PayloadError> {
    let value: Value = serde_json::from_str(arguments)?;
    match kind {
        ToolKind::ActionBatch => extract_actions(value).map(ParsedPayload::Actions),
        ToolKind::Chart => {
            validate_chart(&value)?;
            Ok(ParsedPayload::Chart(value))
        }
        ToolKind::InfoRequest => {
            validate_info_request(&value)?;
            Ok(ParsedPayload::InfoRequest(value))
        }
    }
}

/// Accepts `{actions:[...]}`, a bare array, or (legacy leniency) one
/// action-shaped object, which is wrapped into a one-element list.
/// Non-object items are excluded.
fn extract_actions(value: Value) -> Result<Vec<Value>, PayloadError> {
    let items = match value {
        Value::Object(mut map) => match map.remove("actions") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(PayloadError::SchemaInvalid(format!(
                    "actions field is not an array: {other}"
                )))
            }
            None => {
                // Legacy shape: a single action object with an op field.
                if map.contains_key("op") {
                    vec![Value::Object(map)]
                } else {
                    return Err(PayloadError::SchemaInvalid(
                        "object is neither an action batch nor action-shaped".to_string(),
                    ));
                }
            }
        },
        Value::Array(items) => items,
        other => {
            return Err(PayloadError::SchemaInvalid(format!(
                "expected an object or array, got {other}"
            )))
        }
    };
    Ok(items.into_iter().filter(|item| item.is_object()).collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartSpec {
    kind: Option<String>,
    chart_type: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
    x: Option<KeyRef>,
    #[serde(default)]
    series: Vec<KeyRef>,
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: Option<String>,
}

/// Validates a chart payload structurally. Violations are rejections, not
/// errors: charts are best-effort and the caller skips them.
fn validate_chart(value: &Value) -> Result<(), PayloadError> {
    let spec: ChartSpec =
        serde_json::from_value(value.clone()).map_err(|e| PayloadError::SchemaInvalid(e.to_string()))?;

    if spec.kind.as_deref() != Some("render_chart") {
        return Err(PayloadError::SchemaInvalid("missing render_chart kind tag".to_string()));
    }
    let chart_type = spec
        .chart_type
        .ok_or_else(|| PayloadError::SchemaInvalid("missing chartType".to_string()))?;
    if !CHART_TYPES.contains(&chart_type.as_str()) {
        return Err(PayloadError::SchemaInvalid(format!("unknown chartType {chart_type}")));
    }
    if spec.data.is_empty() || spec.data.len() > MAX_DATA_POINTS {
        return Err(PayloadError::SchemaInvalid(format!(
            "data-point count {} out of bounds",
            spec.data.len()
        )));
    }
    if spec.series.is_empty() || spec.series.len() > MAX_SERIES {
        return Err(PayloadError::SchemaInvalid(format!(
            "series count {} out of bounds",
            spec.series.len()
        )));
    }
    if spec.series.iter().any(|s| s.key.as_deref().unwrap_or("").is_empty()) {
        return Err(PayloadError::SchemaInvalid("series entry missing key".to_string()));
    }
    if spec.x.and_then(|x| x.key).unwrap_or_default().is_empty() {
        return Err(PayloadError::SchemaInvalid("x axis missing key".to_string()));
    }
    if chart_type == "pie" && spec.series.len() != 1 {
        return Err(PayloadError::SchemaInvalid("pie requires exactly one series".to_string()));
    }
    Ok(())
}

/// The closed set of optional info-request sub-objects.
const INFO_SECTIONS: [&str; 3] = ["objective", "key_results", "timeframe"];

/// Requires at least one known sub-object; nested shape is an opaque
/// external contract, so only its structure (object or array) is checked.
fn validate_info_request(value: &Value) -> Result<(), PayloadError> {
    let Value::Object(map) = value else {
        return Err(PayloadError::SchemaInvalid("info request is not an object".to_string()));
    };
    let mut present = 0;
    for section in INFO_SECTIONS {
        if let Some(sub) = map.get(section) {
            if !sub.is_object() && !sub.is_array() {
                return Err(PayloadError::SchemaInvalid(format!(
                    "{section} must be an object or array"
                )));
            }
            present += 1;
        }
    }
    if present == 0 {
        return Err(PayloadError::SchemaInvalid(
            "no recognized info-request section present".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_default_and_lookup() {
        let registry = ToolRegistry::default();
        assert_eq!(registry.kind_for("emit_okrt_actions"), Some(ToolKind::ActionBatch));
        assert_eq!(registry.kind_for("render_chart"), Some(ToolKind::Chart));
        assert_eq!(registry.kind_for("request_more_info"), Some(ToolKind::InfoRequest));
        assert_eq!(registry.kind_for("mystery_tool"), None);
    }

    #[test]
    fn test_actions_wrapped_object() {
        let parsed = extract(ToolKind::ActionBatch, r#"{"actions":[{"op":"create"}]}"#).unwrap();
        assert_eq!(parsed, ParsedPayload::Actions(vec![json!({"op":"create"})]));
    }

    #[test]
    fn test_actions_bare_array() {
        let parsed = extract(ToolKind::ActionBatch, r#"[{"op":"a"},{"op":"b"}]"#).unwrap();
        assert_eq!(
            parsed,
            ParsedPayload::Actions(vec![json!({"op":"a"}), json!({"op":"b"})])
        );
    }

    #[test]
    fn test_actions_legacy_single_object() {
        let parsed = extract(ToolKind::ActionBatch, r#"{"op":"delete","id":"kr-7"}"#).unwrap();
        assert_eq!(
            parsed,
            ParsedPayload::Actions(vec![json!({"op":"delete","id":"kr-7"})])
        );
    }

    #[test]
    fn test_actions_non_object_items_excluded() {
        let parsed = extract(ToolKind::ActionBatch, r#"{"actions":[{"op":"a"},42,"x"]}"#).unwrap();
        assert_eq!(parsed, ParsedPayload::Actions(vec![json!({"op":"a"})]));
    }

    #[test]
    fn test_actions_unrecognizable_object_rejected() {
        let err = extract(ToolKind::ActionBatch, r#"{"hello":"world"}"#).unwrap_err();
        assert!(matches!(err, PayloadError::SchemaInvalid(_)));
    }

    #[test]
    fn test_actions_parse_failure() {
        let err = extract(ToolKind::ActionBatch, r#"{"actions":[{"#).unwrap_err();
        assert!(matches!(err, PayloadError::Parse(_)));
    }

    #[test]
    fn test_chart_valid() {
        let args = r#"{"kind":"render_chart","chartType":"bar","data":[{"q":"Q1","v":3}],"x":{"key":"q"},"series":[{"key":"v"}]}"#;
        assert!(matches!(extract(ToolKind::Chart, args), Ok(ParsedPayload::Chart(_))));
    }

    #[test]
    fn test_chart_pie_requires_exactly_one_series() {
        let args = r#"{"kind":"render_chart","chartType":"pie","data":[{"a":1}],"x":{"key":"a"},"series":[{"key":"v"},{"key":"w"}]}"#;
        assert!(matches!(
            extract(ToolKind::Chart, args),
            Err(PayloadError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn test_chart_unknown_type_rejected() {
        let args = r#"{"kind":"render_chart","chartType":"hologram","data":[{"a":1}],"x":{"key":"a"},"series":[{"key":"v"}]}"#;
        assert!(extract(ToolKind::Chart, args).is_err());
    }

    #[test]
    fn test_chart_missing_series_key_rejected() {
        let args = r#"{"kind":"render_chart","chartType":"line","data":[{"a":1}],"x":{"key":"a"},"series":[{"label":"v"}]}"#;
        assert!(extract(ToolKind::Chart, args).is_err());
    }

    #[test]
    fn test_chart_empty_data_rejected() {
        let args = r#"{"kind":"render_chart","chartType":"bar","data":[],"x":{"key":"a"},"series":[{"key":"v"}]}"#;
        assert!(extract(ToolKind::Chart, args).is_err());
    }

    #[test]
    fn test_info_request_requires_known_section() {
        assert!(extract(ToolKind::InfoRequest, r#"{"objective":{"question":"?"}}"#).is_ok());
        assert!(extract(ToolKind::InfoRequest, r#"{"key_results":[{"ask":"?"}]}"#).is_ok());
        assert!(extract(ToolKind::InfoRequest, r#"{"unrelated":{}}"#).is_err());
        assert!(extract(ToolKind::InfoRequest, r#"{"objective":"scalar"}"#).is_err());
        assert!(extract(ToolKind::InfoRequest, r#"[1,2]"#).is_err());
    }
}
