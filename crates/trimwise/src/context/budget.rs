//! Conversation budget: how large the running history may grow before
//! older turns are collapsed into a digest.
//!
//! Size is estimated, not tokenized. The estimate is deliberately cheap
//! (characters divided by a constant) because it runs before every model
//! call over the entire history.

use crate::Message;
use crate::text::char_len;
use serde::{Deserialize, Serialize};

/// Characters per token used by every estimate in this crate.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default estimated-token threshold that triggers compaction.
pub const DEFAULT_TOKEN_THRESHOLD: usize = 100_000;

/// Default number of most-recent messages kept verbatim.
pub const DEFAULT_KEEP_RECENT: usize = 20;

/// Estimate tokens for a single piece of text.
pub fn estimate_tokens(text: &str) -> usize {
    char_len(text) / CHARS_PER_TOKEN
}

/// Estimate total tokens across all message contents.
///
/// Messages without text content (pure tool-call turns) count as zero.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(m.text())).sum()
}

/// Compaction policy for the running conversation.
///
/// # Example
///
/// ```
/// use trimwise::context::ConversationBudget;
///
/// let budget = ConversationBudget::default()
///     .with_token_threshold(50_000)
///     .with_keep_recent(10);
/// assert!(budget.validate().is_ok());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationBudget {
    /// Estimated tokens at or above which compaction triggers.
    pub token_threshold: usize,
    /// Most-recent messages never touched by compaction. Must be at least 1.
    pub keep_recent: usize,
}

impl Default for ConversationBudget {
    fn default() -> Self {
        Self {
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

impl ConversationBudget {
    pub fn with_token_threshold(mut self, tokens: usize) -> Self {
        self.token_threshold = tokens;
        self
    }

    pub fn with_keep_recent(mut self, n: usize) -> Self {
        self.keep_recent = n;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.keep_recent == 0 {
            return Err("keep_recent must be at least 1".to_string());
        }
        Ok(())
    }

    /// Snapshot of how much of the threshold `messages` consume.
    pub fn usage(&self, messages: &[Message]) -> ContextUsage {
        let estimated_tokens = estimate_messages_tokens(messages);
        let usage_pct = if self.token_threshold > 0 {
            estimated_tokens as f64 / self.token_threshold as f64
        } else {
            1.0
        };
        ContextUsage {
            estimated_tokens,
            threshold: self.token_threshold,
            usage_pct,
        }
    }
}

/// Snapshot of conversation size relative to the compaction threshold.
#[derive(Debug, Clone)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Compaction threshold in estimated tokens.
    pub threshold: usize,
    /// Usage as a fraction of the threshold (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Whether compaction should be considered.
    pub fn over_threshold(&self) -> bool {
        self.estimated_tokens >= self.threshold
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.threshold,
        )
    }
}
