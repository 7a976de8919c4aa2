//! Raw payload persistence.
//!
//! Before any lossy transformation the guard hands the untouched payload
//! to a [`BlobStore`]. The returned location string is quoted back to the
//! model so the full data can be recovered later.
//!
//! ```text
//! mcp_output/
//!   crm_search_20261019_142233.json
//!   crm_search_20261019_142233_1.json   ← same tool, same second
//!   read_sheet_20261019_142301.json
//! ```

use chrono::{DateTime, Local};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Default directory for persisted payloads.
pub const DEFAULT_OUTPUT_DIR: &str = "mcp_output";

/// Durable storage for oversized tool payloads.
///
/// `save` is blocking; the guard calls it from a blocking task.
pub trait BlobStore: Send + Sync {
    /// Persist `payload` and return a human-readable location.
    fn save(&self, tool_name: &str, at: DateTime<Local>, payload: &Value) -> Result<String, String>;
}

/// Text written for a payload: pretty JSON for structured values, the raw
/// text for strings.
pub fn render_blob(payload: &Value) -> Result<String, String> {
    match payload {
        Value::String(s) => Ok(s.clone()),
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(payload)
            .map_err(|e| format!("Failed to serialize payload: {e}")),
        other => Ok(other.to_string()),
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so the tool name is a safe
/// file stem.
fn sanitize_name(tool_name: &str) -> String {
    let cleaned: String = tool_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "tool".to_string()
    } else {
        cleaned
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes each payload to `{dir}/{tool}_{YYYYmmdd_HHMMSS}.json`.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    dir: PathBuf,
}

impl DiskBlobStore {
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate(&self, stem: &str, attempt: u32) -> PathBuf {
        if attempt == 0 {
            self.dir.join(format!("{stem}.json"))
        } else {
            self.dir.join(format!("{stem}_{attempt}.json"))
        }
    }
}

impl Default for DiskBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl BlobStore for DiskBlobStore {
    /// Atomic write: the payload goes to a temp file, then gets hard-linked
    /// under the first free name. An existing file is never overwritten.
    fn save(
        &self,
        tool_name: &str,
        at: DateTime<Local>,
        payload: &Value,
    ) -> Result<String, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create output dir: {e}"))?;

        let stem = format!("{}_{}", sanitize_name(tool_name), at.format("%Y%m%d_%H%M%S"));
        let body = render_blob(payload)?;

        let tmp_path = self.dir.join(format!(
            ".{stem}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        ));
        write_or_discard(&tmp_path, |f| f.write_all(body.as_bytes()))
            .map_err(|e| format!("Failed to write temp file: {e}"))?;

        let mut attempt = 0u32;
        let result = loop {
            let path = self.candidate(&stem, attempt);
            match std::fs::hard_link(&tmp_path, &path) {
                Ok(()) => break Ok(path),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => break Err(format!("Failed to place {}: {e}", path.display())),
            }
        };
        let _ = std::fs::remove_file(&tmp_path);

        let path = result?;
        debug!("Saved {tool_name} payload to {}", path.display());
        Ok(path.display().to_string())
    }
}

/// Create `path` and fill it. A partly written file is removed on error.
fn write_or_discard(
    path: &Path,
    fill: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    if let Err(e) = fill(&mut file).and_then(|()| file.flush()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}
