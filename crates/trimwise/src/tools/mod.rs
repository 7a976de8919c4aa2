//! Tool dispatch with every result piped through the response guard.
//!
//! A [`Tool`] produces a [`RawResult`](crate::guard::RawResult); the
//! [`ToolSet`] that owns it runs the result through its
//! [`ResponseSizeGuard`](crate::guard::ResponseSizeGuard) before handing
//! text back to the conversation. Tools never see the size policy.
//!
//! - **[`FnTool`]**: closure-based, auto-parses arguments.
//! - **`impl Tool`**: a struct with manual [`Tool::definition()`] and
//!   [`Tool::execute()`], for tools with state.

pub mod core;

pub use core::{
    DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolSet, log_tool_call,
    validate_tool_arguments,
};
