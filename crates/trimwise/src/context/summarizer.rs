//! Model-backed summarization shared by the response guard and the
//! conversation budgeter.
//!
//! [`SummarizationService`] is built once at startup by
//! [`SummarizationService::initialize`]. If the backend can't be built (no
//! API key, bad client configuration) the service is permanently
//! unavailable for the life of the process and every call returns
//! [`SummarizeError::Unavailable`]; callers then take their structural
//! fallback. Individual calls fail independently: one failed request says
//! nothing about the next one, and nothing is retried.

use crate::text::{char_len, clip_chars, format_count};
use crate::{ChatRequest, Message, OpenRouterClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// System prompt for tool/API response digests.
const TOOL_OUTPUT_PROMPT: &str = "\
You are a data extraction assistant. Your job is to summarize large tool/API responses \
into a compact format that preserves ALL actionable information.

RULES:
- Preserve ALL: record IDs, names, amounts, dates, stages, statuses, owners, types
- Preserve ALL: relationships, lookup fields, reference IDs, counts, aggregates
- Preserve ALL: error messages, warnings, validation failures
- Remove: redundant metadata fields (attributes, urls, api types), duplicate nested references
- Remove: null/empty fields, system timestamps that aren't business-relevant
- Format: Use structured text, not JSON. Group related records logically.
- If data contains records/rows, present them as a concise numbered list with key fields
- Always state the total count of records at the top
- Keep your summary under 5000 words";

/// System prompt for conversation history digests.
const HISTORY_PROMPT: &str = "\
You are a conversation summarizer for an AI agent system.

Summarize the conversation history preserving ALL:
- What the user asked for and the agent's conclusions/answers
- Key data points retrieved (record IDs, names, amounts, statuses, dates)
- Decisions made, actions taken, tools called and their outcomes
- Any errors encountered and how they were resolved
- Current task context and what the user is working towards

Format as a structured summary with sections. Be thorough but concise.
Keep under 3000 words.";

/// Per-message content limit when rendering history for the summarizer.
pub const HISTORY_MESSAGE_LIMIT: usize = 10_000;

/// Marker appended to clipped content.
pub const TRUNCATED_MARKER: &str = "...[truncated]";

/// Default cap on characters sent to the summarizer in one call.
pub const DEFAULT_INPUT_LIMIT: usize = 200_000;

// ── Settings ───────────────────────────────────────────────────────

/// Summarizer model settings, read once at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SummarizerSettings {
    /// Model identifier sent to the completions endpoint.
    pub model: String,
    /// API credential. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Chat completions endpoint URL.
    pub endpoint: String,
    /// Maximum characters of input per summarization call.
    pub input_limit: usize,
    /// Maximum tokens for the digest.
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// HTTP timeout for one request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_SUMMARIZER_MODEL.to_string(),
            api_key: None,
            endpoint: crate::OPENROUTER_URL.to_string(),
            input_limit: DEFAULT_INPUT_LIMIT,
            max_output_tokens: 4096,
            temperature: 0.0,
            request_timeout_secs: crate::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl SummarizerSettings {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_input_limit(mut self, chars: usize) -> Self {
        self.input_limit = chars;
        self
    }
}

// ── Backend seam ───────────────────────────────────────────────────

/// Boxed future returned by [`CompletionBackend::complete`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// A single request/response text completion.
///
/// Implementations must tolerate concurrent calls; the service never
/// serializes access.
pub trait CompletionBackend: Send + Sync {
    /// Complete `user` under the `system` instruction and return the reply text.
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> CompletionFuture<'a>;
}

/// [`CompletionBackend`] over an OpenRouter-compatible chat endpoint.
pub struct ChatBackend {
    client: OpenRouterClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatBackend {
    /// Build the HTTP client described by `settings`.
    pub fn from_settings(settings: &SummarizerSettings) -> Result<Self, String> {
        let key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| "no API key configured for the summarizer".to_string())?;
        let client = OpenRouterClient::with_endpoint(
            key,
            settings.endpoint.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )?;
        Ok(Self {
            client,
            model: settings.model.clone(),
            max_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
        })
    }
}

impl CompletionBackend for ChatBackend {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let request = ChatRequest {
                model: Some(self.model.clone()),
                messages: vec![Message::system(system), Message::user(user)],
                max_tokens: self.max_tokens,
                temperature: Some(self.temperature),
                ..Default::default()
            };
            let completion = self.client.chat(&request).await?;
            completion
                .content
                .ok_or_else(|| "empty completion".to_string())
        })
    }
}

/// A closure-based backend.
///
/// Handy for embedding a custom model call, and for deterministic tests.
///
/// ```
/// use trimwise::context::{FnBackend, SummarizationService};
/// use std::sync::Arc;
///
/// let backend = FnBackend::new(|_system, user| Ok(format!("{} chars in", user.len())));
/// let service = SummarizationService::with_backend(Arc::new(backend), 1_000);
/// assert!(service.is_available());
/// ```
pub struct FnBackend {
    handler: Box<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>,
}

impl FnBackend {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, String> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl CompletionBackend for FnBackend {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> CompletionFuture<'a> {
        let result = (self.handler)(system, user);
        Box::pin(async move { result })
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a summary could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    /// The backend was never constructed.
    Unavailable,
    /// This one call failed (timeout, quota, HTTP error, empty reply).
    Call(String),
}

impl fmt::Display for SummarizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummarizeError::Unavailable => write!(f, "summarizer unavailable"),
            SummarizeError::Call(reason) => write!(f, "summarization failed: {reason}"),
        }
    }
}

impl std::error::Error for SummarizeError {}

// ── Service ────────────────────────────────────────────────────────

/// Shared summarization entry point.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct SummarizationService {
    backend: Option<Arc<dyn CompletionBackend>>,
    input_limit: usize,
}

impl fmt::Debug for SummarizationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizationService")
            .field("available", &self.is_available())
            .field("input_limit", &self.input_limit)
            .finish()
    }
}

impl SummarizationService {
    /// Build the service from startup settings.
    ///
    /// Never fails: a backend construction error is logged and yields an
    /// unavailable service.
    pub fn initialize(settings: &SummarizerSettings) -> Self {
        match ChatBackend::from_settings(settings) {
            Ok(backend) => {
                info!("Context summarizer initialized: {}", settings.model);
                Self::with_backend(Arc::new(backend), settings.input_limit)
            }
            Err(e) => {
                warn!(
                    "Failed to initialize summarizer: {e}. Falling back to truncation-only mode."
                );
                Self {
                    backend: None,
                    input_limit: settings.input_limit,
                }
            }
        }
    }

    /// Service over an explicit backend.
    pub fn with_backend(backend: Arc<dyn CompletionBackend>, input_limit: usize) -> Self {
        Self {
            backend: Some(backend),
            input_limit,
        }
    }

    /// A service that always reports [`SummarizeError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            backend: None,
            input_limit: DEFAULT_INPUT_LIMIT,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn input_limit(&self) -> usize {
        self.input_limit
    }

    /// Build the (system, user) prompt pair for a tool output digest.
    pub fn build_tool_output_request(&self, source_name: &str, text: &str) -> (String, String) {
        let input = clip_chars(text, self.input_limit);
        let user = format!(
            "Summarize this {source_name} response ({} chars):\n\n{input}",
            format_count(char_len(text)),
        );
        (TOOL_OUTPUT_PROMPT.to_string(), user)
    }

    /// Build the (system, user) prompt pair for a history digest.
    pub fn build_history_request(&self, older: &[Message]) -> (String, String) {
        let mut history = String::new();
        for msg in older {
            let content = msg.text();
            let clipped = clip_chars(content, HISTORY_MESSAGE_LIMIT);
            history.push_str(&format!("[{}]: {clipped}", msg.role));
            if clipped.len() < content.len() {
                history.push_str(TRUNCATED_MARKER);
            }
            history.push_str("\n\n");
        }

        let user = format!(
            "Summarize this conversation history ({} messages):\n\n{}",
            older.len(),
            clip_chars(&history, self.input_limit),
        );
        (HISTORY_PROMPT.to_string(), user)
    }

    /// Digest a large tool/API response.
    ///
    /// The returned text ends with a provenance footer naming the original
    /// size; if the input was clipped before sending, the footer says so.
    pub async fn summarize_tool_output(
        &self,
        source_name: &str,
        text: &str,
    ) -> Result<String, SummarizeError> {
        let (system, user) = self.build_tool_output_request(source_name, text);
        let mut digest = self.call(&system, &user).await?;

        let original = char_len(text);
        if original > self.input_limit {
            digest.push_str(&format!(
                "\n\n[Summarized from {} chars (first {} chars reviewed). \
                 Full data saved to disk.]",
                format_count(original),
                format_count(self.input_limit),
            ));
        } else {
            digest.push_str(&format!(
                "\n\n[Summarized from {} chars. Full data saved to disk.]",
                format_count(original),
            ));
        }

        info!(
            "Summarized {source_name} response: {} -> {} chars",
            format_count(original),
            format_count(char_len(&digest)),
        );
        Ok(digest)
    }

    /// Digest older conversation turns into a sectioned summary.
    pub async fn summarize_history(&self, older: &[Message]) -> Result<String, SummarizeError> {
        let (system, user) = self.build_history_request(older);
        self.call(&system, &user).await
    }

    async fn call(&self, system: &str, user: &str) -> Result<String, SummarizeError> {
        let Some(backend) = &self.backend else {
            return Err(SummarizeError::Unavailable);
        };
        debug!("Summarizer request: {} chars", char_len(user));
        match backend.complete(system, user).await {
            Ok(text) if text.trim().is_empty() => {
                Err(SummarizeError::Call("model returned an empty summary".to_string()))
            }
            Ok(text) => Ok(text.trim().to_string()),
            Err(e) => Err(SummarizeError::Call(e)),
        }
    }
}
