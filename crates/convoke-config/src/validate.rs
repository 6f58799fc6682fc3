//! Cross-reference validation.
//!
//! Runs after parsing and env substitution.  Every id referenced from
//! agents, sequences, knowledge bases, and provider fallbacks must resolve
//! to an *enabled* component; the provider fallback graph must be acyclic.
//! All failures are fatal at load time.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::document::{CoreConfig, OnError};
use crate::error::{ConfigError, Result};

/// Validate the whole document.  Returns the first failure encountered.
pub fn validate(config: &CoreConfig) -> Result<()> {
    check_unique_ids(config)?;
    check_agent_refs(config)?;
    check_tool_relations(config)?;
    check_sequence_refs(config)?;
    check_kb_refs(config)?;
    check_provider_fallback_cycles(config)?;
    check_decision_rules(config)?;
    Ok(())
}

/// `required_by` must resolve; two enabled tools must not conflict.
fn check_tool_relations(config: &CoreConfig) -> Result<()> {
    let enabled = enabled_ids(&config.tools, |t| (t.id.as_str(), t.enabled));

    for tool in config.tools.iter().filter(|t| t.enabled) {
        for conflict in &tool.conflicts_with {
            if enabled.contains(conflict.as_str()) {
                return Err(ConfigError::SchemaError {
                    path: format!("tools.{}", tool.id),
                    reason: format!("conflicts with enabled tool `{conflict}`"),
                });
            }
        }
        for dependent in &tool.required_by {
            let known = config.tools.iter().any(|t| t.id == *dependent)
                || config.agents.iter().any(|a| a.id == *dependent);
            if !known {
                return Err(ConfigError::DanglingReference {
                    from: format!("tools.{}", tool.id),
                    kind: "component",
                    to: dependent.clone(),
                });
            }
        }
    }
    Ok(())
}

fn enabled_ids<'a, I, F>(items: I, id_of: F) -> HashSet<&'a str>
where
    I: IntoIterator,
    F: Fn(I::Item) -> (&'a str, bool),
{
    items
        .into_iter()
        .map(id_of)
        .filter(|(_, enabled)| *enabled)
        .map(|(id, _)| id)
        .collect()
}

fn check_unique_ids(config: &CoreConfig) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    let all = config
        .providers
        .iter()
        .map(|p| ("provider", p.id.as_str()))
        .chain(config.tools.iter().map(|t| ("tool", t.id.as_str())))
        .chain(config.agents.iter().map(|a| ("agent", a.id.as_str())))
        .chain(config.knowledge_bases.iter().map(|k| ("knowledge base", k.id.as_str())))
        .chain(config.tool_sequences.iter().map(|s| ("sequence", s.id.as_str())));

    for (kind, id) in all {
        if let Some(prior) = seen.insert(id, kind) {
            // Ids are unique within a kind; duplicates across kinds are fine.
            if prior == kind {
                return Err(ConfigError::SchemaError {
                    path: format!("{kind}.{id}"),
                    reason: "duplicate id".into(),
                });
            }
        }
    }
    Ok(())
}

fn check_agent_refs(config: &CoreConfig) -> Result<()> {
    let tools = enabled_ids(&config.tools, |t| (t.id.as_str(), t.enabled));
    let agents = enabled_ids(&config.agents, |a| (a.id.as_str(), a.enabled));

    for agent in config.agents.iter().filter(|a| a.enabled) {
        for tool_id in &agent.allowed_tools {
            if !tools.contains(tool_id.as_str()) {
                return Err(ConfigError::DanglingReference {
                    from: format!("agents.{}", agent.id),
                    kind: "tool",
                    to: tool_id.clone(),
                });
            }
        }
        for sub_id in &agent.allowed_subagents {
            if !agents.contains(sub_id.as_str()) {
                return Err(ConfigError::DanglingReference {
                    from: format!("agents.{}", agent.id),
                    kind: "agent",
                    to: sub_id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_sequence_refs(config: &CoreConfig) -> Result<()> {
    let tools = enabled_ids(&config.tools, |t| (t.id.as_str(), t.enabled));
    let providers = enabled_ids(&config.providers, |p| (p.id.as_str(), p.enabled));

    for seq in config.tool_sequences.iter().filter(|s| s.enabled) {
        if seq.steps.is_empty() {
            return Err(ConfigError::SchemaError {
                path: format!("tool_sequences.{}", seq.id),
                reason: "sequence has no steps".into(),
            });
        }

        for step in &seq.steps {
            let at = format!("tool_sequences.{}.step{}", seq.id, step.order);

            match (&step.tool, &step.mcp) {
                (Some(_), Some(_)) | (None, None) => {
                    return Err(ConfigError::SchemaError {
                        path: at,
                        reason: "exactly one of `tool` / `mcp` must be set".into(),
                    });
                }
                (Some(tool_id), None) => {
                    if !tools.contains(tool_id.as_str()) {
                        return Err(ConfigError::DanglingReference {
                            from: at,
                            kind: "tool",
                            to: tool_id.clone(),
                        });
                    }
                }
                (None, Some(mcp_id)) => {
                    if !providers.contains(mcp_id.as_str()) {
                        return Err(ConfigError::DanglingReference {
                            from: at,
                            kind: "provider",
                            to: mcp_id.clone(),
                        });
                    }
                }
            }

            if step.on_error == OnError::Fallback {
                let Some(fallback) = &step.fallback_mcp else {
                    return Err(ConfigError::SchemaError {
                        path: at,
                        reason: "on_error = fallback requires `fallback_mcp`".into(),
                    });
                };
                if step.mcp.is_none() {
                    return Err(ConfigError::SchemaError {
                        path: at,
                        reason: "on_error = fallback is only valid for mcp steps".into(),
                    });
                }
                if !providers.contains(fallback.as_str()) {
                    return Err(ConfigError::DanglingReference {
                        from: at,
                        kind: "provider",
                        to: fallback.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_kb_refs(config: &CoreConfig) -> Result<()> {
    let providers = enabled_ids(&config.providers, |p| (p.id.as_str(), p.enabled));

    for kb in config.knowledge_bases.iter().filter(|k| k.enabled) {
        if !providers.contains(kb.embedding_provider.as_str()) {
            return Err(ConfigError::DanglingReference {
                from: format!("knowledge_bases.{}", kb.id),
                kind: "provider",
                to: kb.embedding_provider.clone(),
            });
        }
        if kb.dimension == 0 {
            return Err(ConfigError::SchemaError {
                path: format!("knowledge_bases.{}", kb.id),
                reason: "dimension must be positive".into(),
            });
        }
    }
    Ok(())
}

/// Depth-first traversal over `fallback_provider` edges.  A back edge is a
/// cycle; the error carries the full path for diagnostics.
fn check_provider_fallback_cycles(config: &CoreConfig) -> Result<()> {
    let by_id: HashMap<&str, &crate::document::ProviderConfig> =
        config.providers.iter().map(|p| (p.id.as_str(), p)).collect();

    for start in &config.providers {
        if let Some(target) = &start.fallback_provider {
            if !by_id.get(target.as_str()).map(|p| p.enabled).unwrap_or(false) {
                return Err(ConfigError::DanglingReference {
                    from: format!("providers.{}", start.id),
                    kind: "provider",
                    to: target.clone(),
                });
            }
        }

        let mut path: Vec<&str> = vec![start.id.as_str()];
        let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut current = start;

        while let Some(next_id) = &current.fallback_provider {
            let Some(next) = by_id.get(next_id.as_str()) else {
                break; // dangling, reported above for its owner
            };
            if !visited.insert(next.id.as_str()) {
                path.push(next.id.as_str());
                return Err(ConfigError::CycleError {
                    path: path.join(" -> "),
                });
            }
            path.push(next.id.as_str());
            current = next;
        }
    }
    Ok(())
}

fn check_decision_rules(config: &CoreConfig) -> Result<()> {
    let tools = enabled_ids(&config.tools, |t| (t.id.as_str(), t.enabled));
    let agents = enabled_ids(&config.agents, |a| (a.id.as_str(), a.enabled));

    for rule in &config.decision.rules {
        Regex::new(&rule.pattern).map_err(|e| ConfigError::InvalidRulePattern {
            pattern: rule.pattern.clone(),
            reason: e.to_string(),
        })?;

        if let Some(component) = &rule.component {
            let resolves = match rule.strategy {
                crate::document::RuleStrategy::Tool => tools.contains(component.as_str()),
                crate::document::RuleStrategy::Agent => agents.contains(component.as_str()),
                _ => true,
            };
            if !resolves {
                return Err(ConfigError::DanglingReference {
                    from: format!("decision.rules[{}]", rule.pattern),
                    kind: match rule.strategy {
                        crate::document::RuleStrategy::Agent => "agent",
                        _ => "tool",
                    },
                    to: component.clone(),
                });
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

    fn parse(doc: &str) -> CoreConfig {
        toml::from_str(doc).expect("test doc parses")
    }

    #[test]
    fn valid_document_passes() {
        let config = parse(
            r#"
            [[providers]]
            id = "main"
            type = "cloud"
            base_url = "https://api.example.com/v1"
            models = ["m"]

            [[tools]]
            id = "calculator"
            category = "execution"

            [[agents]]
            id = "helper"
            class = "code_analyzer"
            allowed_tools = ["calculator"]
        "#,
        );
        validate(&config).expect("valid");
    }

    #[test]
    fn dangling_agent_tool_reference() {
        let config = parse(
            r#"
            [[agents]]
            id = "helper"
            class = "code_analyzer"
            allowed_tools = ["ghost"]
        "#,
        );
        let err = validate(&config).expect_err("must fail");
        assert!(matches!(err, ConfigError::DanglingReference { kind: "tool", .. }));
    }

    #[test]
    fn disabled_tool_counts_as_dangling() {
        let config = parse(
            r#"
            [[tools]]
            id = "calculator"
            category = "execution"
            enabled = false

            [[agents]]
            id = "helper"
            class = "code_analyzer"
            allowed_tools = ["calculator"]
        "#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn step_must_name_exactly_one_target() {
        let config = parse(
            r#"
            [[tool_sequences]]
            id = "s"
            [[tool_sequences.steps]]
            order = 1
            action = "x"
        "#,
        );
        let err = validate(&config).expect_err("must fail");
        assert!(matches!(err, ConfigError::SchemaError { .. }));
    }

    #[test]
    fn fallback_cycle_is_traced() {
        let config = parse(
            r#"
            [[providers]]
            id = "a"
            type = "cloud"
            base_url = "https://a/v1"
            models = ["m"]
            fallback_provider = "b"

            [[providers]]
            id = "b"
            type = "cloud"
            base_url = "https://b/v1"
            models = ["m"]
            fallback_provider = "a"
        "#,
        );
        let err = validate(&config).expect_err("cycle");
        match err {
            ConfigError::CycleError { path } => {
                assert!(path.contains("a -> b -> a") || path.contains("b -> a -> b"), "{path}");
            }
            other => panic!("expected CycleError, got {other:?}"),
        }
    }

    #[test]
    fn fallback_chain_without_cycle_passes() {
        let config = parse(
            r#"
            [[providers]]
            id = "a"
            type = "cloud"
            base_url = "https://a/v1"
            models = ["m"]
            fallback_provider = "b"

            [[providers]]
            id = "b"
            type = "local"
            base_url = "http://localhost:11434/v1"
            models = ["m"]
        "#,
        );
        validate(&config).expect("acyclic chain is fine");
    }

    #[test]
    fn invalid_rule_regex_is_rejected() {
        let config = parse(
            r#"
            [[decision.rules]]
            pattern = "[unclosed"
            strategy = "llm"
        "#,
        );
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidRulePattern { .. })
        ));
    }

    #[test]
    fn conflicting_enabled_tools_are_rejected() {
        let config = parse(
            r#"
            [[tools]]
            id = "fast_reader"
            category = "file"
            conflicts_with = ["safe_reader"]

            [[tools]]
            id = "safe_reader"
            category = "file"
        "#,
        );
        let err = validate(&config).expect_err("conflict");
        assert!(err.to_string().contains("conflicts"));

        // Disabling one side resolves the conflict.
        let config = parse(
            r#"
            [[tools]]
            id = "fast_reader"
            category = "file"
            conflicts_with = ["safe_reader"]

            [[tools]]
            id = "safe_reader"
            category = "file"
            enabled = false
        "#,
        );
        validate(&config).expect("no conflict when disabled");
    }

    #[test]
    fn fallback_requires_mcp_step() {
        let config = parse(
            r#"
            [[providers]]
            id = "backup"
            type = "cloud"
            base_url = "https://b/v1"
            models = ["m"]

            [[tools]]
            id = "calculator"
            category = "execution"

            [[tool_sequences]]
            id = "s"
            [[tool_sequences.steps]]
            order = 1
            tool = "calculator"
            action = "soma"
            on_error = "fallback"
            fallback_mcp = "backup"
        "#,
        );
        let err = validate(&config).expect_err("tool step cannot fallback to mcp");
        assert!(matches!(err, ConfigError::SchemaError { .. }));
    }
}
