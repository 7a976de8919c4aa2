//! Conversation-level context management: budgets, summarization, and
//! compaction.
//!
//! 1. **[`budget`]**: [`ConversationBudget`] estimates token usage
//!    (characters / 4) and decides when the history has outgrown its
//!    threshold.
//!
//! 2. **[`summarizer`]**: [`SummarizationService`], the one model-call
//!    abstraction shared with the [response guard](crate::guard). It has an
//!    explicit availability flag and a single failure type.
//!
//! 3. **[`compactor`]**: [`ConversationBudgeter`] folds older turns into a
//!    synthetic digest message and keeps the most recent turns verbatim:
//!    - **Digest**: one system message tagged `[CONVERSATION HISTORY SUMMARY]`.
//!    - **Recency window**: last `keep_recent` messages, unmodified.

pub mod budget;
pub mod compactor;
pub mod summarizer;

pub use budget::{
    CHARS_PER_TOKEN, ContextUsage, ConversationBudget, estimate_messages_tokens, estimate_tokens,
};
pub use compactor::{
    Compaction, ConversationBudgeter, DIGEST_FOOTER, DIGEST_HEADER, digest_message,
    is_history_digest, trim_to_recent,
};
pub use summarizer::{
    ChatBackend, CompletionBackend, CompletionFuture, FnBackend, SummarizationService,
    SummarizeError, SummarizerSettings,
};
