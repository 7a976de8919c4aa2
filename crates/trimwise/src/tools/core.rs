//! Tool abstraction with size-guarded dispatch.
//!
//! The [`Tool`] trait defines what every tool implements: a static API
//! definition (name, description, JSON schema) and an async `execute`
//! method returning a [`RawResult`]. Tools are collected into a [`ToolSet`],
//! which dispatches calls and pipes every successful result through a
//! [`ResponseSizeGuard`] before it is handed back as history text.

use crate::guard::{GuardOutput, RawResult, ResponseSizeGuard, log_guard_output};
use crate::{Message, ToolCall, ToolDef};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Boxed future returned by [`Tool::execute`].
///
/// `Err` carries a short failure description; it is reported to the model
/// as `"Error: ..."` and never passes through the guard.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<RawResult, String>> + Send + 'a>>;

/// An async tool callable by the model.
///
/// # Example
///
/// ```ignore
/// struct CrmSearch { client: CrmClient }
///
/// impl Tool for CrmSearch {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move {
///             let records = self.client.query(&arguments).await?;
///             Ok(RawResult::from_serialize(&records))
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the LLM API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (convenience; delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// Default timeout for tool execution (60 seconds).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A collection of tools dispatched by name, with every result bounded by
/// a shared [`ResponseSizeGuard`].
///
/// # Example
///
/// ```ignore
/// let guard = ResponseSizeGuard::new(thresholds, summarizer, store);
/// let tools = ToolSet::new(guard)
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)))
///     .with(CrmSearch::new(client));
///
/// let defs = tools.definitions();
/// let tool_messages = tools.execute_calls(&assistant_tool_calls).await;
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    guard: ResponseSizeGuard,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("guard", &self.guard)
            .finish()
    }
}

impl ToolSet {
    /// Create an empty tool set around `guard`.
    pub fn new(guard: ResponseSizeGuard) -> Self {
        Self {
            tools: HashMap::new(),
            guard,
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a default timeout for tool execution. Pass `None` to disable.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Return all tool definitions for the LLM API, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn guard(&self) -> &ResponseSizeGuard {
        &self.guard
    }

    /// Execute a tool and return the guard's decision.
    ///
    /// `Err` holds the error string for the model: unknown tool, invalid
    /// arguments, timeout, or the tool's own failure.
    pub async fn execute_guarded(
        &self,
        name: &str,
        arguments: &str,
    ) -> Result<GuardOutput, String> {
        let Some(tool) = self.tools.get(name) else {
            return Err(format!("Error: unknown tool '{name}'"));
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return Err(error);
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let result = if let Some(limit) = self.default_timeout {
            match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    return Err(format!(
                        "Error: tool '{name}' timed out after {:.0} seconds.",
                        limit.as_secs_f64(),
                    ));
                }
            }
        } else {
            tool.execute(arguments).await
        };

        debug!(
            "Tool {name} completed in {:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0,
        );

        let raw = result.map_err(|e| format!("Error: {e}"))?;
        let output = self.guard.process(name, raw).await;
        log_guard_output(name, &output);
        Ok(output)
    }

    /// Execute a tool and return the text for the tool-result message.
    ///
    /// Returns an error string if the tool name is unknown or execution fails.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        match self.execute_guarded(name, arguments).await {
            Ok(output) => {
                let text = output.into_text();
                trace!(
                    "Tool {name} result preview: {}",
                    crate::text::clip_chars(&text, 300)
                );
                text
            }
            Err(e) => e,
        }
    }

    /// Run every call concurrently and return one tool-result message per
    /// call, in call order.
    pub async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<Message> {
        let futures: Vec<_> = calls
            .iter()
            .map(|call| async move {
                let text = self
                    .execute(&call.function.name, &call.function.arguments)
                    .await;
                Message::tool_result(call.id.clone(), text)
            })
            .collect();
        futures::future::join_all(futures).await
    }
}

// ── FnTool ─────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<dyn Fn(String) -> ToolFuture<'static> + Send + Sync>;

/// A closure-based tool.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct SheetArgs { range: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("read_sheet", "Read a sheet range", json_schema_for::<SheetArgs>()),
///     |args: SheetArgs| async move { Ok(json!({"range": args.range, "rows": []})) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    /// Create a closure-based tool.
    ///
    /// The handler receives arguments of type `A`, deserialized from the raw
    /// JSON string. Parse errors are reported to the model without calling
    /// the handler.
    pub fn new<A, F, Fut, R>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
        R: Into<RawResult> + 'static,
    {
        let erased = move |raw: String| -> ToolFuture<'static> {
            let args: A = match serde_json::from_str(&raw) {
                Ok(a) => a,
                Err(e) => {
                    return Box::pin(async move {
                        Err(format!(
                            "invalid tool arguments: {e}. \
                             Please provide valid JSON matching the tool's parameter schema."
                        ))
                    });
                }
            };
            let fut = handler(args);
            Box::pin(async move { fut.await.map(Into::into) })
        };

        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or `Some(error_string)` formatted for the model
/// to self-correct.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "Error: invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;

    // An invalid schema skips validation.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return None;
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Error: argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}
