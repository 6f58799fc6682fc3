//! File reading tool.
//!
//! Reads text files relative to a configured root directory.  Paths are
//! normalized and validated against traversal out of the root; an
//! allow-list of extensions and a size cap bound what the tool will return.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::traits::{Tool, require_str};

/// Maximum characters returned per read to bound token usage downstream.
const MAX_READ_CHARS: usize = 16_000;

/// Root-confined file reader.
pub struct FileReader {
    id: String,
    root_dir: PathBuf,
    /// Lowercased extensions without the dot; empty allows any.
    allowed_extensions: Vec<String>,
}

impl FileReader {
    pub fn new(
        id: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            root_dir: root_dir.into(),
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Resolve a user-supplied path against the root and reject anything
    /// that would escape it.
    fn safe_resolve(&self, raw_path: &str) -> Result<PathBuf> {
        let candidate = if Path::new(raw_path).is_absolute() {
            PathBuf::from(raw_path)
        } else {
            self.root_dir.join(raw_path)
        };

        // Normalize without touching the filesystem; the target may exist
        // behind a symlink-free path we can check lexically.
        let normalized = normalize_path(&candidate);

        let canon_root = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());

        if !normalized.starts_with(&canon_root) && !normalized.starts_with(&self.root_dir) {
            return Err(ToolError::ConstraintViolation {
                tool: self.id.clone(),
                reason: format!("path `{raw_path}` escapes the allowed root"),
            });
        }

        Ok(normalized)
    }

    fn check_extension(&self, path: &Path) -> Result<()> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&ext) {
            return Err(ToolError::ConstraintViolation {
                tool: self.id.clone(),
                reason: format!("extension `.{ext}` is not allowed"),
            });
        }
        Ok(())
    }
}

/// Lexically normalize `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[async_trait]
impl Tool for FileReader {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, action: &str, params: Value) -> Result<Value> {
        if !action.is_empty() && action != "read" {
            return Err(ToolError::UnknownAction {
                tool: self.id.clone(),
                action: action.to_string(),
            });
        }

        let raw_path = require_str(&params, "path", &self.id)?;
        let full_path = self.safe_resolve(raw_path)?;
        self.check_extension(&full_path)?;

        debug!(tool = %self.id, path = %full_path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            ToolError::ExecutionFailed {
                tool: self.id.clone(),
                reason: format!("read failed for `{raw_path}`: {e}"),
            }
        })?;

        let total_chars = raw.chars().count();
        let (content, truncated) = if total_chars > MAX_READ_CHARS {
            (raw.chars().take(MAX_READ_CHARS).collect::<String>(), true)
        } else {
            (raw, false)
        };

        Ok(json!({
            "path": full_path.display().to_string(),
            "content": content,
            "chars": total_chars,
            "truncated": truncated,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
