//! Task management agent.
//!
//! Keeps an in-memory task list per instance: `schedule` adds a task,
//! `execute` marks the oldest pending task done, `report` summarizes the
//! list.  The verb is taken from the message; anything unrecognized gets a
//! usage hint.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::Result;
use crate::traits::{Agent, AgentInput, AgentOutput, AgentServices};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum TaskStatus {
    Pending,
    Done,
}

#[derive(Debug, Clone, Serialize)]
struct TaskRecord {
    id: Uuid,
    description: String,
    status: TaskStatus,
    created_at: DateTime<Utc>,
}

/// Schedule / execute / report over an in-memory task list.
pub struct TaskManager {
    id: String,
    tasks: Mutex<Vec<TaskRecord>>,
}

impl TaskManager {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn verb_of(message: &str) -> &'static str {
        let lowered = message.to_lowercase();
        if lowered.contains("schedule") || lowered.contains("agendar") {
            "schedule"
        } else if lowered.contains("execute") || lowered.contains("executar") {
            "execute"
        } else if lowered.contains("report") || lowered.contains("list") {
            "report"
        } else {
            "unknown"
        }
    }

    /// The task description is whatever follows the verb (or the colon).
    fn description_of(message: &str) -> String {
        let tail = message
            .split_once(':')
            .map(|(_, tail)| tail)
            .unwrap_or(message);
        let description = tail.trim();
        if description.is_empty() {
            "unnamed task".to_string()
        } else {
            description.to_string()
        }
    }
}

#[async_trait]
impl Agent for TaskManager {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        input: AgentInput,
        _services: &dyn AgentServices,
    ) -> Result<AgentOutput> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        match Self::verb_of(&input.message) {
            "schedule" => {
                let record = TaskRecord {
                    id: Uuid::now_v7(),
                    description: Self::description_of(&input.message),
                    status: TaskStatus::Pending,
                    created_at: Utc::now(),
                };
                let text = format!("Scheduled task: {}", record.description);
                let data = json!({"task": &record});
                tasks.push(record);
                Ok(AgentOutput {
                    text,
                    data: Some(data),
                })
            }
            "execute" => match tasks.iter_mut().find(|t| t.status == TaskStatus::Pending) {
                Some(task) => {
                    task.status = TaskStatus::Done;
                    Ok(AgentOutput {
                        text: format!("Executed task: {}", task.description),
                        data: Some(json!({"task": task.clone()})),
                    })
                }
                None => Ok(AgentOutput::text_only("No pending tasks to execute.")),
            },
            "report" => {
                let pending = tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
                let done = tasks.len() - pending;
                Ok(AgentOutput {
                    text: format!(
                        "Task report: {} total, {pending} pending, {done} done.",
                        tasks.len()
                    ),
                    data: Some(json!({"tasks": &*tasks})),
                })
            }
            _ => Ok(AgentOutput::text_only(
                "I can schedule, execute, or report tasks. Try: \"schedule task: backup the database\".",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    struct NoServices;

    #[async_trait]
    impl AgentServices for NoServices {
        async fn run_tool(&self, agent: &str, tool: &str, _: &str, _: Value) -> Result<Value> {
            Err(AgentError::PermissionDenied {
                agent: agent.into(),
                kind: "tool",
                target: tool.into(),
            })
        }

        async fn complete(&self, agent: &str, _: &str) -> Result<String> {
            Err(AgentError::CompletionFailed {
                agent: agent.into(),
                reason: "unused".into(),
            })
        }

        async fn call_subagent(&self, agent: &str, sub: &str, _: AgentInput) -> Result<AgentOutput> {
            Err(AgentError::PermissionDenied {
                agent: agent.into(),
                kind: "agent",
                target: sub.into(),
            })
        }
    }

    fn input(message: &str) -> AgentInput {
        AgentInput {
            message: message.into(),
            params: Value::Null,
            trace_id: "t-1".into(),
        }
    }

    #[tokio::test]
    async fn schedule_then_execute_then_report() {
        let agent = TaskManager::new("task_manager");

        let out = agent
            .execute(input("schedule task: rotate the logs"), &NoServices)
            .await
            .expect("schedule");
        assert!(out.text.contains("rotate the logs"));

        let out = agent
            .execute(input("execute the next task"), &NoServices)
            .await
            .expect("execute");
        assert!(out.text.starts_with("Executed task"));

        let out = agent
            .execute(input("report tasks"), &NoServices)
            .await
            .expect("report");
        assert!(out.text.contains("1 total, 0 pending, 1 done"));
    }

    #[tokio::test]
    async fn execute_with_nothing_pending() {
        let agent = TaskManager::new("task_manager");
        let out = agent
            .execute(input("execute tasks"), &NoServices)
            .await
            .expect("runs");
        assert!(out.text.contains("No pending tasks"));
    }

    #[tokio::test]
    async fn unknown_verb_gets_usage_hint() {
        let agent = TaskManager::new("task_manager");
        let out = agent
            .execute(input("what about my chores"), &NoServices)
            .await
            .expect("runs");
        assert!(out.text.contains("schedule, execute, or report"));
    }
}
