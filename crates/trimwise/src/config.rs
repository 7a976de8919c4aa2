//! Process configuration.
//!
//! Every limit has a default; environment variables override individual
//! values. Read once at startup and pass the pieces to the components:
//!
//! ```ignore
//! let config = TrimwiseConfig::from_env()?;
//! config.validate()?;
//! let summarizer = SummarizationService::initialize(&config.summarizer);
//! ```
//!
//! | Variable                                 | Field                               |
//! |------------------------------------------|-------------------------------------|
//! | `TOOL_RESPONSE_SUMMARIZE_THRESHOLD`      | `thresholds.summarize_threshold`    |
//! | `MCP_MAX_RESPONSE_SIZE`                  | `thresholds.hard_cap`               |
//! | `MCP_MAX_STRING_LENGTH`                  | `thresholds.max_scalar_length`      |
//! | `MCP_MAX_LIST_ITEMS`                     | `thresholds.max_sequence_items`     |
//! | `CONVERSATION_SUMMARIZE_TOKEN_THRESHOLD` | `budget.token_threshold`            |
//! | `CONVERSATION_KEEP_RECENT_MESSAGES`      | `budget.keep_recent`                |
//! | `SUMMARIZER_INPUT_LIMIT`                 | `summarizer.input_limit`            |
//! | `SUMMARIZER_MODEL`                       | `summarizer.model`                  |
//! | `OPENROUTER_KEY` / `OPENAI_API_KEY`      | `summarizer.api_key`                |
//! | `TRIMWISE_OUTPUT_DIR`                    | `output_dir`                        |

use crate::context::{ConversationBudget, SummarizerSettings};
use crate::guard::{DEFAULT_OUTPUT_DIR, SizeThresholds};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Everything the budgeting subsystem needs at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrimwiseConfig {
    pub thresholds: SizeThresholds,
    pub budget: ConversationBudget,
    pub summarizer: SummarizerSettings,
    /// Directory for persisted raw payloads.
    pub output_dir: PathBuf,
}

impl Default for TrimwiseConfig {
    fn default() -> Self {
        Self {
            thresholds: SizeThresholds::default(),
            budget: ConversationBudget::default(),
            summarizer: SummarizerSettings::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl TrimwiseConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        let t = &mut config.thresholds;
        override_num(&get, "TOOL_RESPONSE_SUMMARIZE_THRESHOLD", &mut t.summarize_threshold)?;
        override_num(&get, "MCP_MAX_RESPONSE_SIZE", &mut t.hard_cap)?;
        override_num(&get, "MCP_MAX_STRING_LENGTH", &mut t.max_scalar_length)?;
        override_num(&get, "MCP_MAX_LIST_ITEMS", &mut t.max_sequence_items)?;

        let b = &mut config.budget;
        override_num(&get, "CONVERSATION_SUMMARIZE_TOKEN_THRESHOLD", &mut b.token_threshold)?;
        override_num(&get, "CONVERSATION_KEEP_RECENT_MESSAGES", &mut b.keep_recent)?;

        let s = &mut config.summarizer;
        override_num(&get, "SUMMARIZER_INPUT_LIMIT", &mut s.input_limit)?;
        if let Some(model) = get("SUMMARIZER_MODEL") {
            s.model = model;
        }
        s.api_key = get("OPENROUTER_KEY").or_else(|| get("OPENAI_API_KEY"));

        if let Some(dir) = get("TRIMWISE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.thresholds.validate()?;
        self.budget.validate()?;
        if self.summarizer.input_limit == 0 {
            return Err("summarizer input_limit must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn with_thresholds(mut self, thresholds: SizeThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_budget(mut self, budget: ConversationBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_summarizer(mut self, summarizer: SummarizerSettings) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Pretty JSON for display. The API key is never included.
    pub fn to_report(&self) -> Result<String, String> {
        let mut report = serde_json::to_value(self)
            .map_err(|e| format!("Failed to serialize config: {e}"))?;
        report["summarizer"]["api_key_set"] =
            serde_json::Value::Bool(self.summarizer.api_key.is_some());
        serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize config: {e}"))
    }
}

fn override_num<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), String>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {key}={raw:?}: {e}"))?;
    }
    Ok(())
}
