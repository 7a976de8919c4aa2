//! Convenience re-exports for common `trimwise` types.
//!
//! ```ignore
//! use trimwise::prelude::*;
//! ```
//!
//! Covers wiring the guard and budgeter into an agent loop. Shape-level
//! helpers (excerpts, structural truncation) and the structured-reply
//! parsers stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, OpenRouterClient, ToolCall, ToolDef, json_schema_for};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::TrimwiseConfig;

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    Compaction, CompletionBackend, ConversationBudget, ConversationBudgeter, FnBackend,
    SummarizationService, SummarizeError, SummarizerSettings,
};

// ── Response guard ──────────────────────────────────────────────────
pub use crate::guard::{
    BlobStore, DiskBlobStore, GuardOutput, RawResult, ResponseSizeGuard, SizeThresholds,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolFuture, ToolSet};
