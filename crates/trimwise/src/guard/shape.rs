//! Payload shapes and the structural truncation applied to each.
//!
//! Every tool payload is one of three shapes. Truncation is a pure
//! function of the shape and the [`SizeThresholds`]:
//!
//! | Shape    | Strategy                                                        |
//! |----------|-----------------------------------------------------------------|
//! | Mapping  | clip long string fields, cap long sequence fields               |
//! | Sequence | keep the first entries (each truncated), then a count marker    |
//! | Scalar   | clip the text                                                   |
//!
//! Nested mappings and sequences get the same treatment, so the result is
//! bounded by the limits at every depth.

use super::SizeThresholds;
use crate::text::{char_len, clip_chars};
use serde_json::Value;

/// Marker appended to clipped string fields.
pub const FIELD_TRUNCATED_MARKER: &str = "...[truncated]";

/// Synthetic entry appended to a capped sequence.
pub fn more_items_marker(dropped: usize) -> String {
    format!("... and {dropped} more items")
}

/// The closed set of payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// A keyed object.
    Mapping,
    /// An ordered list.
    Sequence,
    /// Anything else: strings, numbers, booleans, null.
    Scalar,
}

impl PayloadShape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => PayloadShape::Mapping,
            Value::Array(_) => PayloadShape::Sequence,
            _ => PayloadShape::Scalar,
        }
    }
}

/// Render a payload as the text measured against the thresholds.
///
/// Structured payloads serialize to compact JSON; strings are used
/// verbatim; other scalars are stringified.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Output of [`truncate_structure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralTruncation {
    pub shape: PayloadShape,
    /// The truncated payload rendered as text.
    pub text: String,
    /// String fields that were clipped.
    pub clipped_fields: usize,
    /// Sequence entries dropped across all depths.
    pub dropped_items: usize,
}

/// Apply the per-shape truncation strategy to `value`.
pub fn truncate_structure(value: &Value, limits: &SizeThresholds) -> StructuralTruncation {
    let shape = PayloadShape::of(value);
    let mut clipped_fields = 0;
    let mut dropped_items = 0;

    let text = match shape {
        PayloadShape::Mapping | PayloadShape::Sequence => {
            let truncated = truncate_value(value, limits, &mut clipped_fields, &mut dropped_items);
            truncated.to_string()
        }
        PayloadShape::Scalar => {
            let text = render(value);
            if char_len(&text) > limits.max_scalar_length {
                clipped_fields = 1;
                clip_chars(&text, limits.max_scalar_length).to_string()
            } else {
                text
            }
        }
    };

    StructuralTruncation {
        shape,
        text,
        clipped_fields,
        dropped_items,
    }
}

fn truncate_value(
    value: &Value,
    limits: &SizeThresholds,
    clipped: &mut usize,
    dropped: &mut usize,
) -> Value {
    match value {
        Value::String(s) if char_len(s) > limits.max_scalar_length => {
            *clipped += 1;
            Value::String(format!(
                "{}{FIELD_TRUNCATED_MARKER}",
                clip_chars(s, limits.max_scalar_length)
            ))
        }
        Value::Array(items) => {
            let keep = items.len().min(limits.max_sequence_items);
            let mut out: Vec<Value> = items
                .iter()
                .take(keep)
                .map(|item| truncate_value(item, limits, clipped, dropped))
                .collect();
            if items.len() > keep {
                let rest = items.len() - keep;
                *dropped += rest;
                out.push(Value::String(more_items_marker(rest)));
            }
            Value::Array(out)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_value(v, limits, clipped, dropped)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits(max_scalar: usize, max_items: usize) -> SizeThresholds {
        SizeThresholds::default()
            .with_max_scalar_length(max_scalar)
            .with_max_sequence_items(max_items)
    }

    #[test]
    fn classifies_shapes() {
        assert_eq!(PayloadShape::of(&json!({"a": 1})), PayloadShape::Mapping);
        assert_eq!(PayloadShape::of(&json!([1, 2])), PayloadShape::Sequence);
        assert_eq!(PayloadShape::of(&json!("text")), PayloadShape::Scalar);
        assert_eq!(PayloadShape::of(&json!(3.5)), PayloadShape::Scalar);
        assert_eq!(PayloadShape::of(&Value::Null), PayloadShape::Scalar);
    }

    #[test]
    fn render_keeps_strings_verbatim() {
        assert_eq!(render(&json!("plain \"text\"")), "plain \"text\"");
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn mapping_fields_are_clipped_and_capped() {
        let value = json!({
            "notes": "n".repeat(30),
            "ids": (0..8).collect::<Vec<_>>(),
            "status": "open",
        });
        let out = truncate_structure(&value, &limits(10, 5));
        assert_eq!(out.shape, PayloadShape::Mapping);
        assert_eq!(out.clipped_fields, 1);
        assert_eq!(out.dropped_items, 3);

        let parsed: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(parsed["notes"], format!("{}...[truncated]", "n".repeat(10)));
        assert_eq!(parsed["ids"], json!([0, 1, 2, 3, 4, "... and 3 more items"]));
        assert_eq!(parsed["status"], "open");
    }

    #[test]
    fn sequence_keeps_first_entries_and_clips_their_fields() {
        let records: Vec<Value> = (0..250)
            .map(|i| json!({"Id": format!("00{i}"), "Description": "d".repeat(40)}))
            .collect();
        let out = truncate_structure(&Value::Array(records), &limits(20, 100));
        assert_eq!(out.shape, PayloadShape::Sequence);
        assert_eq!(out.dropped_items, 150);
        assert_eq!(out.clipped_fields, 100);

        let parsed: Vec<Value> = serde_json::from_str(&out.text).unwrap();
        assert_eq!(parsed.len(), 101);
        assert_eq!(parsed[0]["Id"], "000");
        assert_eq!(parsed[100], "... and 150 more items");
        assert!(parsed[99]["Description"].as_str().unwrap().ends_with("...[truncated]"));
    }

    #[test]
    fn short_sequences_get_no_marker() {
        let out = truncate_structure(&json!([1, 2, 3]), &limits(10, 3));
        assert_eq!(out.text, "[1,2,3]");
        assert_eq!(out.dropped_items, 0);
    }

    #[test]
    fn scalar_is_clipped_without_marker() {
        let out = truncate_structure(&json!("s".repeat(600)), &limits(100, 10));
        assert_eq!(out.shape, PayloadShape::Scalar);
        assert_eq!(out.text, "s".repeat(100));
        assert_eq!(out.clipped_fields, 1);
    }

    #[test]
    fn nested_structures_are_bounded() {
        let value = json!({
            "page": {
                "rows": (0..500).map(|i| json!({"v": "x".repeat(i % 50)})).collect::<Vec<_>>(),
            },
        });
        let out = truncate_structure(&value, &limits(10, 20));
        let parsed: Value = serde_json::from_str(&out.text).unwrap();
        let rows = parsed["page"]["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 21);
        assert_eq!(out.dropped_items, 480);
        for row in rows.iter().take(20) {
            assert!(char_len(row["v"].as_str().unwrap()) <= 10 + FIELD_TRUNCATED_MARKER.len());
        }
    }

    #[test]
    fn empty_payloads_pass_through_structurally() {
        assert_eq!(truncate_structure(&json!({}), &limits(1, 1)).text, "{}");
        assert_eq!(truncate_structure(&json!([]), &limits(1, 1)).text, "[]");
        assert_eq!(truncate_structure(&json!(""), &limits(1, 1)).text, "");
    }
}
