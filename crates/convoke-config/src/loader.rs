//! Document loading.
//!
//! `load_path` reads TOML or JSON (selected by extension), applies `${NAME}`
//! env substitution to string leaves, deserializes into [`CoreConfig`], and
//! runs cross-reference validation.  The returned record is immutable.

use std::path::Path;

use crate::document::CoreConfig;
use crate::env;
use crate::error::{ConfigError, Result};
use crate::validate;

/// Load, substitute, deserialize, and validate a configuration file.
pub fn load_path(path: impl AsRef<Path>) -> Result<CoreConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    load_str(&raw, is_json)
}

/// Load from an in-memory document.  `is_json` selects the parser; TOML
/// otherwise.
pub fn load_str(raw: &str, is_json: bool) -> Result<CoreConfig> {
    let mut value: serde_json::Value = if is_json {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?
    } else {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?
    };

    env::substitute(&mut value)?;

    let config: CoreConfig =
        serde_json::from_value(value).map_err(|e| ConfigError::SchemaError {
            path: "<root>".into(),
            reason: e.to_string(),
        })?;

    validate::validate(&config)?;

    tracing::info!(
        providers = config.providers.len(),
        tools = config.tools.len(),
        agents = config.agents.len(),
        sequences = config.tool_sequences.len(),
        "configuration loaded"
    );

    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
