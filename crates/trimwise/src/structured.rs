//! Structured (JSON) model replies.
//!
//! Some turns ask the model for a JSON object instead of prose. The schema
//! is appended to the last user message as an instruction, and the reply is
//! parsed leniently: the outermost `{…}` span is extracted before parsing,
//! so a reply wrapped in prose or a code fence still works. Anything that
//! can't be parsed or fails schema validation comes back as a
//! [`MalformedReply`] carrying the raw text.

use crate::context::{ConversationBudgeter, trim_to_recent};
use crate::{Message, MessageRole, json_schema_for};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Message count kept for structured turns that are under the token threshold.
pub const STRUCTURED_RECENT_MESSAGES: usize = 10;

/// A reply that could not be turned into the expected JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReply {
    /// The model's reply, verbatim.
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for MalformedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed structured reply: {}", self.reason)
    }
}

impl std::error::Error for MalformedReply {}

/// Instruction text demanding JSON that matches `schema`.
pub fn schema_instruction(schema: &Value) -> String {
    let schema_str = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "\n\nIMPORTANT: You MUST respond with valid JSON matching this exact schema:\n\
         {schema_str}\n\nDo not include any text outside the JSON object."
    )
}

/// Append the schema instruction to the last message if it is from the user.
///
/// Returns whether the instruction was added.
pub fn append_schema_instruction(messages: &mut [Message], schema: &Value) -> bool {
    match messages.last_mut() {
        Some(last) if last.role == MessageRole::User => {
            let content = last.content.get_or_insert_with(String::new);
            content.push_str(&schema_instruction(schema));
            true
        }
        _ => false,
    }
}

/// Prepare history for a structured turn.
///
/// Strictly over the token threshold the history is compacted; otherwise
/// (including exactly at the threshold) it is cut to the last
/// [`STRUCTURED_RECENT_MESSAGES`]. The schema instruction is then appended.
pub async fn prepare_structured_turn(
    budgeter: &ConversationBudgeter,
    messages: Vec<Message>,
    schema: &Value,
) -> Vec<Message> {
    let usage = budgeter.budget().usage(&messages);
    let mut messages = if usage.estimated_tokens > usage.threshold {
        budgeter.compact(messages).await.into_messages()
    } else {
        trim_to_recent(messages, STRUCTURED_RECENT_MESSAGES)
    };
    if !append_schema_instruction(&mut messages, schema) {
        debug!("Last message is not from the user; schema instruction not added");
    }
    messages
}

/// The outermost `{…}` span of `raw`, if any.
fn outer_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    raw.get(start..=end)
}

/// Parse a model reply as JSON, validating against `schema` when given.
pub fn parse_structured_reply(raw: &str, schema: Option<&Value>) -> Result<Value, MalformedReply> {
    let malformed = |reason: String| MalformedReply {
        raw: raw.to_string(),
        reason,
    };

    let candidate = outer_object(raw).unwrap_or(raw);
    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| malformed(format!("Failed to parse JSON: {e}")))?;

    if let Some(schema) = schema {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| malformed(format!("invalid schema: {e}")))?;
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("  - {}: {e}", e.instance_path()))
            .collect();
        if !errors.is_empty() {
            warn!("Structured reply failed validation ({} errors)", errors.len());
            return Err(malformed(format!(
                "schema validation failed:\n{}",
                errors.join("\n")
            )));
        }
    }

    Ok(value)
}

/// Parse and validate a reply against `T`'s derived schema, then
/// deserialize it.
pub fn parse_typed_reply<T: JsonSchema + DeserializeOwned>(raw: &str) -> Result<T, MalformedReply> {
    let schema = json_schema_for::<T>();
    let value = parse_structured_reply(raw, Some(&schema))?;
    serde_json::from_value(value).map_err(|e| MalformedReply {
        raw: raw.to_string(),
        reason: format!("Failed to deserialize: {e}"),
    })
}

/// Wire shape of a structured turn's outcome.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StructuredReply {
    pub data: Option<Value>,
    pub raw_response: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StructuredReply {
    pub fn from_raw(raw: &str, schema: Option<&Value>) -> Self {
        match parse_structured_reply(raw, schema) {
            Ok(data) => Self {
                data: Some(data),
                raw_response: raw.to_string(),
                success: true,
                error: None,
            },
            Err(e) => Self {
                data: None,
                raw_response: e.raw,
                success: false,
                error: Some(e.reason),
            },
        }
    }
}
