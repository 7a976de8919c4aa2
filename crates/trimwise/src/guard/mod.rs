//! Response size guard: bounds every tool result before it enters history.
//!
//! The guard measures the result's rendered length and picks one tier:
//!
//! ```text
//! len ≤ summarize_threshold   → PassThrough        (no side effects)
//! len ≤ hard_cap              → persist, summarize  → Summarized | Excerpt
//! len > hard_cap              → persist, truncate by shape, summarize
//!                                                   → TruncatedSummarized | Truncated
//! ```
//!
//! Anything above the summarize threshold is saved through a
//! [`BlobStore`](store::BlobStore) before any lossy step, so the full data
//! stays recoverable. The guard holds no state between calls.

pub mod excerpt;
pub mod shape;
pub mod store;

use crate::context::SummarizationService;
use crate::text::{char_len, clip_chars, format_count};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use shape::{PayloadShape, StructuralTruncation, truncate_structure};
pub use store::{BlobStore, DEFAULT_OUTPUT_DIR, DiskBlobStore};

// ── Thresholds ─────────────────────────────────────────────────────

/// Size limits for tool results, in characters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SizeThresholds {
    /// Results at or below this length pass through untouched.
    pub summarize_threshold: usize,
    /// Results above this length are truncated by shape before summarizing.
    pub hard_cap: usize,
    /// Longest string field kept by structural truncation, and the size
    /// budget for excerpts.
    pub max_scalar_length: usize,
    /// Sequence entries kept by structural truncation.
    pub max_sequence_items: usize,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            summarize_threshold: 50_000,
            hard_cap: 500_000,
            max_scalar_length: 50_000,
            max_sequence_items: 100,
        }
    }
}

impl SizeThresholds {
    pub fn with_summarize_threshold(mut self, chars: usize) -> Self {
        self.summarize_threshold = chars;
        self
    }

    pub fn with_hard_cap(mut self, chars: usize) -> Self {
        self.hard_cap = chars;
        self
    }

    pub fn with_max_scalar_length(mut self, chars: usize) -> Self {
        self.max_scalar_length = chars;
        self
    }

    pub fn with_max_sequence_items(mut self, n: usize) -> Self {
        self.max_sequence_items = n;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.summarize_threshold > self.hard_cap {
            return Err(format!(
                "summarize_threshold ({}) must not exceed hard_cap ({})",
                self.summarize_threshold, self.hard_cap
            ));
        }
        if self.max_scalar_length == 0 {
            return Err("max_scalar_length must be at least 1".to_string());
        }
        Ok(())
    }
}

// ── Input ──────────────────────────────────────────────────────────

/// A tool's raw result, before any size policy is applied.
///
/// Results built from text keep that text. It is what the thresholds are
/// measured against and what a pass-through hands back, so JSON key order
/// and number spelling survive. The parsed value only drives persistence
/// and structural truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    value: Value,
    source: Option<String>,
}

impl RawResult {
    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            source: None,
        }
    }

    /// Text that parses as a JSON object or array is treated as structured;
    /// anything else is a plain string.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(value @ (Value::Object(_) | Value::Array(_))) =
                serde_json::from_str::<Value>(&text)
        {
            return Self {
                value,
                source: Some(text),
            };
        }
        Self::from_value(Value::String(text))
    }

    /// Convert any serializable value. If serialization fails the value's
    /// `Debug` text is used instead.
    pub fn from_serialize<T: Serialize + Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::from_value(v),
            Err(e) => {
                warn!("Tool result failed to serialize ({e}); using its debug text");
                Self::from_value(Value::String(format!("{value:?}")))
            }
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The text this result was parsed from, when it came from text.
    pub fn source_text(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn shape(&self) -> PayloadShape {
        PayloadShape::of(&self.value)
    }

    /// The text measured against the thresholds.
    pub fn render(&self) -> String {
        match &self.source {
            Some(text) => text.clone(),
            None => shape::render(&self.value),
        }
    }

    /// Like [`RawResult::render`], without copying a kept source text.
    pub fn into_text(self) -> String {
        match self.source {
            Some(text) => text,
            None => shape::render(&self.value),
        }
    }
}

impl From<Value> for RawResult {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl From<String> for RawResult {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

impl From<&str> for RawResult {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

// ── Output ─────────────────────────────────────────────────────────

/// What the guard did with a result.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutput {
    /// Small enough; the original result, untouched.
    PassThrough(RawResult),
    /// Model digest of the full result.
    Summarized {
        digest: String,
        location: Option<String>,
    },
    /// Summarization unreachable; head/tail excerpt of the full result.
    Excerpt {
        text: String,
        location: Option<String>,
    },
    /// Model digest of the structurally truncated result.
    TruncatedSummarized {
        digest: String,
        location: Option<String>,
    },
    /// Summarization unreachable; the structurally truncated result, clipped.
    Truncated {
        text: String,
        location: Option<String>,
    },
}

impl GuardOutput {
    /// The text handed to the conversation history.
    pub fn into_text(self) -> String {
        match self {
            GuardOutput::PassThrough(raw) => raw.into_text(),
            GuardOutput::Summarized { digest, .. }
            | GuardOutput::TruncatedSummarized { digest, .. } => digest,
            GuardOutput::Excerpt { text, .. } | GuardOutput::Truncated { text, .. } => text,
        }
    }

    /// Borrowed text for every variant except [`GuardOutput::PassThrough`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GuardOutput::PassThrough(_) => None,
            GuardOutput::Summarized { digest, .. }
            | GuardOutput::TruncatedSummarized { digest, .. } => Some(digest),
            GuardOutput::Excerpt { text, .. } | GuardOutput::Truncated { text, .. } => Some(text),
        }
    }

    /// Where the full payload was saved, if it was.
    pub fn location(&self) -> Option<&str> {
        match self {
            GuardOutput::PassThrough(_) => None,
            GuardOutput::Summarized { location, .. }
            | GuardOutput::Excerpt { location, .. }
            | GuardOutput::TruncatedSummarized { location, .. }
            | GuardOutput::Truncated { location, .. } => location.as_deref(),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, GuardOutput::PassThrough(_))
    }

    pub fn is_summarized(&self) -> bool {
        matches!(
            self,
            GuardOutput::Summarized { .. } | GuardOutput::TruncatedSummarized { .. }
        )
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GuardOutput::PassThrough(_) => "pass-through",
            GuardOutput::Summarized { .. } => "summarized",
            GuardOutput::Excerpt { .. } => "excerpt",
            GuardOutput::TruncatedSummarized { .. } => "truncated+summarized",
            GuardOutput::Truncated { .. } => "truncated",
        }
    }
}

// ── Guard ──────────────────────────────────────────────────────────

/// Applies [`SizeThresholds`] to tool results.
#[derive(Clone)]
pub struct ResponseSizeGuard {
    thresholds: SizeThresholds,
    summarizer: SummarizationService,
    store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for ResponseSizeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSizeGuard")
            .field("thresholds", &self.thresholds)
            .field("summarizer", &self.summarizer)
            .finish_non_exhaustive()
    }
}

impl ResponseSizeGuard {
    pub fn new(
        thresholds: SizeThresholds,
        summarizer: SummarizationService,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            thresholds,
            summarizer,
            store,
        }
    }

    pub fn thresholds(&self) -> &SizeThresholds {
        &self.thresholds
    }

    /// Bound `raw` according to the thresholds. Never fails.
    pub async fn process(&self, tool_name: &str, raw: impl Into<RawResult>) -> GuardOutput {
        let raw = raw.into();
        let text = raw.render();
        let len = char_len(&text);

        if len <= self.thresholds.summarize_threshold {
            return GuardOutput::PassThrough(raw);
        }

        let location = self.persist(tool_name, raw.value(), len).await;

        if len <= self.thresholds.hard_cap {
            return match self.summarizer.summarize_tool_output(tool_name, &text).await {
                Ok(digest) => GuardOutput::Summarized { digest, location },
                Err(e) => {
                    warn!("Summarization of {tool_name} failed, falling back to excerpt: {e}");
                    let text = excerpt::head_tail(
                        &text,
                        self.thresholds.max_scalar_length,
                        location.as_deref(),
                    );
                    GuardOutput::Excerpt { text, location }
                }
            };
        }

        let truncation = truncate_structure(raw.value(), &self.thresholds);
        info!(
            "Structurally truncated {tool_name} ({:?}): {} -> {} chars, \
             {} fields clipped, {} items dropped",
            truncation.shape,
            format_count(len),
            format_count(char_len(&truncation.text)),
            truncation.clipped_fields,
            truncation.dropped_items,
        );

        match self
            .summarizer
            .summarize_tool_output(tool_name, &truncation.text)
            .await
        {
            Ok(digest) => GuardOutput::TruncatedSummarized { digest, location },
            Err(e) => {
                warn!("Summarization of truncated {tool_name} failed: {e}");
                let text = self.truncated_fallback(&truncation.text, location.as_deref());
                GuardOutput::Truncated { text, location }
            }
        }
    }

    /// The truncated text clipped to the scalar limit, with a note naming
    /// the saved payload. Text still over the limit becomes a head/tail
    /// excerpt so the elided amount is stated.
    fn truncated_fallback(&self, text: &str, location: Option<&str>) -> String {
        let max = self.thresholds.max_scalar_length;
        if char_len(text) > max {
            return excerpt::head_tail(text, max, location);
        }
        let mut out = clip_chars(text, max).to_string();
        match location {
            Some(loc) => out.push_str(&format!("\n\n[Response truncated. Full data: {loc}]")),
            None => out.push_str("\n\n[Response truncated.]"),
        }
        out
    }

    /// Save the raw payload. Failures are logged and yield `None`.
    ///
    /// The write runs on the blocking pool and completes even if this
    /// future is dropped.
    async fn persist(&self, tool_name: &str, payload: &Value, len: usize) -> Option<String> {
        let store = Arc::clone(&self.store);
        let name = tool_name.to_string();
        let payload = payload.clone();
        let at = Local::now();

        let saved =
            tokio::task::spawn_blocking(move || store.save(&name, at, &payload)).await;
        match saved {
            Ok(Ok(location)) => {
                info!(
                    "Saved full {tool_name} response to {location} ({} chars)",
                    format_count(len)
                );
                Some(location)
            }
            Ok(Err(e)) => {
                warn!("Failed to persist {tool_name} response: {e}");
                None
            }
            Err(e) => {
                warn!("Persist task for {tool_name} did not complete: {e}");
                None
            }
        }
    }
}

/// Log a guard decision at debug level.
pub(crate) fn log_guard_output(tool_name: &str, output: &GuardOutput) {
    debug!(
        "Guard {tool_name}: {}{}",
        output.kind(),
        output
            .location()
            .map(|l| format!(" (full data: {l})"))
            .unwrap_or_default(),
    );
}
