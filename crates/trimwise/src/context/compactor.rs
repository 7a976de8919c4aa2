//! Conversation compaction.
//!
//! When the running history crosses the token threshold, everything except
//! the most recent `keep_recent` messages is folded into a single synthetic
//! system message. The recent tail is always preserved verbatim.

use super::budget::ConversationBudget;
use super::summarizer::SummarizationService;
use crate::{Message, MessageRole};
use tracing::{info, warn};

/// Opening tag of a history digest message.
pub const DIGEST_HEADER: &str = "[CONVERSATION HISTORY SUMMARY]";

/// Closing tag of a history digest message.
pub const DIGEST_FOOTER: &str = "[END SUMMARY - Recent messages follow below]";

/// Wrap a history summary in the digest tags as a system message.
pub fn digest_message(summary: &str) -> Message {
    Message::system(format!("{DIGEST_HEADER}\n{summary}\n{DIGEST_FOOTER}"))
}

/// Whether `message` is a synthetic digest produced by compaction.
pub fn is_history_digest(message: &Message) -> bool {
    message.role == MessageRole::System && message.text().starts_with(DIGEST_HEADER)
}

/// Keep only the last `n` messages.
///
/// Used on paths that bound history by count rather than size.
pub fn trim_to_recent(mut messages: Vec<Message>, n: usize) -> Vec<Message> {
    if messages.len() > n {
        messages.drain(..messages.len() - n);
    }
    messages
}

/// Result of a compaction pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Compaction {
    /// Under threshold, or too few messages to split.
    Unchanged(Vec<Message>),
    /// Older turns replaced by one digest message.
    Summarized {
        messages: Vec<Message>,
        /// How many older messages the digest covers.
        folded: usize,
    },
    /// Summarization failed; older turns were dropped without a digest.
    RecentOnly {
        messages: Vec<Message>,
        dropped: usize,
    },
}

impl Compaction {
    pub fn messages(&self) -> &[Message] {
        match self {
            Compaction::Unchanged(m) => m,
            Compaction::Summarized { messages, .. } | Compaction::RecentOnly { messages, .. } => {
                messages
            }
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Compaction::Unchanged(m) => m,
            Compaction::Summarized { messages, .. } | Compaction::RecentOnly { messages, .. } => {
                messages
            }
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Compaction::Unchanged(_))
    }

    /// Whether older turns were lost without a digest.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Compaction::RecentOnly { .. })
    }
}

/// Keeps the running conversation under the token threshold.
#[derive(Debug, Clone)]
pub struct ConversationBudgeter {
    budget: ConversationBudget,
    summarizer: SummarizationService,
}

impl ConversationBudgeter {
    pub fn new(budget: ConversationBudget, summarizer: SummarizationService) -> Self {
        Self { budget, summarizer }
    }

    pub fn budget(&self) -> &ConversationBudget {
        &self.budget
    }

    /// Compact `messages` if they exceed the budget.
    ///
    /// Never fails. If the summarizer is unavailable or the call fails, the
    /// result is [`Compaction::RecentOnly`].
    pub async fn compact(&self, messages: Vec<Message>) -> Compaction {
        let usage = self.budget.usage(&messages);
        if !usage.over_threshold() {
            return Compaction::Unchanged(messages);
        }

        let keep = self.budget.keep_recent.max(1);
        if messages.len() <= keep {
            return Compaction::Unchanged(messages);
        }

        info!(
            "Conversation at ~{} tokens ({} messages), compacting",
            usage.estimated_tokens,
            messages.len(),
        );

        let mut older = messages;
        let recent = older.split_off(older.len() - keep);
        let folded = older.len();

        match self.summarizer.summarize_history(&older).await {
            Ok(summary) => {
                let mut out = Vec::with_capacity(recent.len() + 1);
                out.push(digest_message(&summary));
                out.extend(recent);
                info!(
                    "Compacted {} older messages into summary, keeping {} recent",
                    folded, keep,
                );
                Compaction::Summarized {
                    messages: out,
                    folded,
                }
            }
            Err(e) => {
                warn!("History summarization failed: {e}. Keeping {keep} recent messages only.");
                Compaction::RecentOnly {
                    messages: recent,
                    dropped: folded,
                }
            }
        }
    }
}
