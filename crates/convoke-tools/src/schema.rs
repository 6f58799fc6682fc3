//! Parameter validation against declared tool schemas.
//!
//! Before a tool runs, its resolved params are checked against the
//! [`ToolConfig`] schema: required fields, primitive types, enumerations,
//! numeric ranges, and defaults.  When the call targets a named action, only
//! that action's parameter subset applies.

use serde_json::{Map, Value};

use convoke_config::{ParamSpec, ParamType, ToolConfig};

use crate::error::{Result, ToolError};

/// Validate `params` for `action` against the tool's schema, returning the
/// params with defaults filled in.
///
/// A tool with no declared params accepts anything (built-ins validate
/// internally).
pub fn validate_params(config: &ToolConfig, action: &str, params: &Value) -> Result<Value> {
    if config.params.is_empty() {
        return Ok(params.clone());
    }

    let invalid = |reason: String| ToolError::InvalidParams {
        tool: config.id.clone(),
        reason,
    };

    let supplied = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => return Err(invalid("params must be an object".into())),
    };

    // Resolve the parameter subset for a named action.
    let relevant: Vec<(&String, &ParamSpec)> = match config.actions.get(action) {
        Some(spec) if !spec.params.is_empty() => config
            .params
            .iter()
            .filter(|(name, _)| spec.params.contains(name))
            .collect(),
        _ => {
            if !config.actions.is_empty() && !config.actions.contains_key(action) {
                return Err(ToolError::UnknownAction {
                    tool: config.id.clone(),
                    action: action.to_string(),
                });
            }
            config.params.iter().collect()
        }
    };

    let mut out = Map::new();
    for (name, spec) in relevant {
        let value = match supplied.get(name) {
            Some(v) => v.clone(),
            None => match (&spec.default, spec.required) {
                (Some(default), _) => default.clone(),
                (None, true) => {
                    return Err(invalid(format!("missing required parameter `{name}`")));
                }
                (None, false) => continue,
            },
        };

        check_type(name, spec, &value).map_err(&invalid)?;
        out.insert(name.clone(), value);
    }

    Ok(Value::Object(out))
}

fn check_type(name: &str, spec: &ParamSpec, value: &Value) -> std::result::Result<(), String> {
    let type_ok = match spec.kind {
        ParamType::String => value.is_string(),
        ParamType::Number => value.is_number(),
        ParamType::Integer => value.is_i64() || value.is_u64(),
        ParamType::Boolean => value.is_boolean(),
        ParamType::Object => value.is_object(),
        ParamType::Array => value.is_array(),
    };
    if !type_ok {
        return Err(format!("parameter `{name}` has the wrong type"));
    }

    if !spec.one_of.is_empty() && !spec.one_of.contains(value) {
        return Err(format!("parameter `{name}` is not one of the allowed values"));
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = spec.min {
            if n < min {
                return Err(format!("parameter `{name}` is below the minimum {min}"));
            }
        }
        if let Some(max) = spec.max {
            if n > max {
                return Err(format!("parameter `{name}` is above the maximum {max}"));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_config::{ActionSpec, ToolCategory, ToolConstraints};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn tool_config() -> ToolConfig {
        let mut params = BTreeMap::new();
        params.insert(
            "a".to_string(),
            ParamSpec {
                kind: ParamType::Number,
                required: true,
                default: None,
                one_of: vec![],
                min: Some(0.0),
                max: Some(100.0),
            },
        );
        params.insert(
            "mode".to_string(),
            ParamSpec {
                kind: ParamType::String,
                required: false,
                default: Some(json!("fast")),
                one_of: vec![json!("fast"), json!("thorough")],
                min: None,
                max: None,
            },
        );

        let mut actions = BTreeMap::new();
        actions.insert(
            "run".to_string(),
            ActionSpec {
                params: vec!["a".into(), "mode".into()],
            },
        );
        actions.insert(
            "peek".to_string(),
            ActionSpec {
                params: vec!["mode".into()],
            },
        );

        ToolConfig {
            id: "widget".into(),
            enabled: true,
            category: ToolCategory::Execution,
            description: String::new(),
            params,
            actions,
            constraints: ToolConstraints::default(),
            required_by: vec![],
            conflicts_with: vec![],
        }
    }

    #[test]
    fn defaults_are_applied() {
        let config = tool_config();
        let out = validate_params(&config, "run", &json!({"a": 5})).expect("valid");
        assert_eq!(out["a"], 5);
        assert_eq!(out["mode"], "fast");
    }

    #[test]
    fn missing_required_param_fails() {
        let config = tool_config();
        let err = validate_params(&config, "run", &json!({})).expect_err("must fail");
        assert!(matches!(err, ToolError::InvalidParams { .. }));
    }

    #[test]
    fn wrong_type_fails() {
        let config = tool_config();
        assert!(validate_params(&config, "run", &json!({"a": "five"})).is_err());
    }

    #[test]
    fn range_is_enforced() {
        let config = tool_config();
        assert!(validate_params(&config, "run", &json!({"a": 101})).is_err());
        assert!(validate_params(&config, "run", &json!({"a": 100})).is_ok());
    }

    #[test]
    fn enum_is_enforced() {
        let config = tool_config();
        let err =
            validate_params(&config, "run", &json!({"a": 1, "mode": "sloppy"})).expect_err("fail");
        assert!(err.to_string().contains("allowed values"));
    }

    #[test]
    fn action_subset_ignores_other_params() {
        let config = tool_config();
        // `peek` only takes `mode`; the required `a` does not apply.
        let out = validate_params(&config, "peek", &json!({})).expect("valid");
        assert_eq!(out["mode"], "fast");
        assert!(out.get("a").is_none());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let config = tool_config();
        assert!(matches!(
            validate_params(&config, "explode", &json!({})),
            Err(ToolError::UnknownAction { .. })
        ));
    }
}
