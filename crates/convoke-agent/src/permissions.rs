//! Centralized permission checks.
//!
//! The orchestrator calls these from its [`crate::AgentServices`]
//! implementation before any dispatch, so a denied call never reaches the
//! tool or subagent.  An empty allow-list means "all allowed"; the
//! permission bits gate whole capability classes.

use convoke_config::AgentConfig;

use crate::error::{AgentError, Result};

/// May `agent` call `tool_id`?
pub fn check_tool(agent: &AgentConfig, tool_id: &str) -> Result<()> {
    if !agent.permissions.use_tools {
        return Err(AgentError::PermissionDenied {
            agent: agent.id.clone(),
            kind: "tool",
            target: tool_id.to_string(),
        });
    }
    if agent.allowed_tools.is_empty() || agent.allowed_tools.iter().any(|t| t == tool_id) {
        return Ok(());
    }
    Err(AgentError::PermissionDenied {
        agent: agent.id.clone(),
        kind: "tool",
        target: tool_id.to_string(),
    })
}

/// May `agent` delegate to `subagent_id`?
pub fn check_subagent(agent: &AgentConfig, subagent_id: &str) -> Result<()> {
    if !agent.permissions.call_subagents {
        return Err(AgentError::PermissionDenied {
            agent: agent.id.clone(),
            kind: "agent",
            target: subagent_id.to_string(),
        });
    }
    if agent.allowed_subagents.is_empty()
        || agent.allowed_subagents.iter().any(|a| a == subagent_id)
    {
        return Ok(());
    }
    Err(AgentError::PermissionDenied {
        agent: agent.id.clone(),
        kind: "agent",
        target: subagent_id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use convoke_config::AgentPermissions;

    fn agent(allowed_tools: Vec<&str>, use_tools: bool) -> AgentConfig {
        AgentConfig {
            id: "code_analyzer".into(),
            class: "code_analyzer".into(),
            version: "1.0.0".into(),
            enabled: true,
            description: String::new(),
            allowed_tools: allowed_tools.into_iter().map(String::from).collect(),
            allowed_subagents: vec![],
            routing: Default::default(),
            permissions: AgentPermissions {
                use_tools,
                call_subagents: false,
                ..Default::default()
            },
            mcp_preference: None,
            fallback_allowed: true,
        }
    }

    #[test]
    fn empty_allow_list_means_all() {
        let config = agent(vec![], true);
        assert!(check_tool(&config, "anything").is_ok());
    }

    #[test]
    fn listed_tool_is_allowed_unlisted_denied() {
        let config = agent(vec!["file_reader", "code_executor"], true);
        assert!(check_tool(&config, "file_reader").is_ok());

        let err = check_tool(&config, "json_parser").expect_err("denied");
        assert!(matches!(
            err,
            AgentError::PermissionDenied { kind: "tool", .. }
        ));
    }

    #[test]
    fn use_tools_bit_gates_everything() {
        let config = agent(vec![], false);
        assert!(check_tool(&config, "file_reader").is_err());
    }

    #[test]
    fn subagent_calls_need_the_bit() {
        let config = agent(vec![], true);
        assert!(matches!(
            check_subagent(&config, "task_manager"),
            Err(AgentError::PermissionDenied { kind: "agent", .. })
        ));
    }
}
