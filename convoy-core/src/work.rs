//! Unit-of-work and task models.
//!
//! A unit of work is an atomic, dependency-ordered batch of agent-invocation
//! tasks for one journey stage, with optional saga compensation tasks that
//! run in reverse order after an unrecoverable failure.

use crate::{prefixed_id, JourneyStage, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Individual task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Never ran because a dependency failed
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Unit of work execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Saga compensation in progress
    Compensating,
    /// Saga compensation completed
    Compensated,
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkStatus::Pending => "pending",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
            WorkStatus::Compensating => "compensating",
            WorkStatus::Compensated => "compensated",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A single agent invocation within a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub name: String,
    pub description: String,
    /// Agent responsible for execution
    pub agent_id: String,
    /// Intent sent to the agent via the protocol
    pub intent: String,
    pub input_schema: Map<String, Value>,
    pub output_schema: Map<String, Value>,
    /// Task IDs that must complete first
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            agent_id: agent_id.into(),
            intent: intent.into(),
            input_schema: Map::new(),
            output_schema: Map::new(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

/// Dependency-ordered batch of tasks for one journey stage.
///
/// Mutated in place by the executor; callers must not run the same instance
/// from two threads concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOfWork {
    pub work_id: String,
    /// Journey stage this unit of work belongs to
    pub stage: JourneyStage,
    pub client_id: String,
    pub tasks: Vec<Task>,
    pub status: WorkStatus,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    pub metadata: Map<String, Value>,
    /// Saga compensation tasks, run in reverse order on failure
    pub compensation_tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_task_id: Option<String>,
}

impl UnitOfWork {
    pub fn new(stage: JourneyStage, client_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            work_id: prefixed_id("uow"),
            stage,
            client_id: client_id.into(),
            tasks,
            status: WorkStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: Map::new(),
            compensation_tasks: Vec::new(),
            failed_task_id: None,
        }
    }

    pub fn with_compensation_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.compensation_tasks = tasks;
        self
    }

    /// Get task by ID.
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    pub fn completed_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect()
    }

    pub fn failed_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }

    /// Tasks that can run now: pending, with every dependency completed.
    pub fn runnable_tasks(&self) -> Vec<&Task> {
        let completed: HashSet<&str> = self
            .completed_tasks()
            .iter()
            .map(|t| t.task_id.as_str())
            .collect();

        self.pending_tasks()
            .into_iter()
            .filter(|t| t.depends_on.iter().all(|d| completed.contains(d.as_str())))
            .collect()
    }

    /// Check for circular dependencies in the task graph (DFS).
    pub fn has_circular_dependencies(&self) -> bool {
        let graph: HashMap<&str, &[String]> = self
            .tasks
            .iter()
            .map(|t| (t.task_id.as_str(), t.depends_on.as_slice()))
            .collect();

        fn walk<'a>(
            node: &'a str,
            graph: &HashMap<&'a str, &'a [String]>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
        ) -> bool {
            visited.insert(node);
            stack.insert(node);

            if let Some(deps) = graph.get(node) {
                for dep in deps.iter() {
                    if !visited.contains(dep.as_str()) {
                        if walk(dep, graph, visited, stack) {
                            return true;
                        }
                    } else if stack.contains(dep.as_str()) {
                        return true;
                    }
                }
            }

            stack.remove(node);
            false
        }

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        for task in &self.tasks {
            if !visited.contains(task.task_id.as_str())
                && walk(task.task_id.as_str(), &graph, &mut visited, &mut stack)
            {
                return true;
            }
        }
        false
    }

    /// Wall-clock execution duration, if the run has started.
    pub fn execution_duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - started).to_std().ok()
    }
}

// ============================================================================
// EXECUTION RESULT
// ============================================================================

/// Outcome of one unit-of-work execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub work_id: String,
    pub status: WorkStatus,
    pub completed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    /// Result payloads keyed by task ID
    pub task_results: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub compensation_executed: bool,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_uow() -> UnitOfWork {
        // a <- b <- c
        UnitOfWork::new(
            JourneyStage::Sandbox,
            "acme",
            vec![
                Task::new("a", "generate", "gen", "generate"),
                Task::new("b", "validate", "val", "validate")
                    .with_depends_on(vec!["a".to_string()]),
                Task::new("c", "provision", "prov", "provision")
                    .with_depends_on(vec!["a".to_string(), "b".to_string()]),
            ],
        )
    }

    #[test]
    fn test_runnable_requires_all_dependencies_completed() {
        let mut uow = chain_uow();
        let runnable: Vec<&str> = uow.runnable_tasks().iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(runnable, vec!["a"]);

        uow.tasks[0].status = TaskStatus::Completed;
        let runnable: Vec<&str> = uow.runnable_tasks().iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(runnable, vec!["b"]);

        uow.tasks[1].status = TaskStatus::Completed;
        let runnable: Vec<&str> = uow.runnable_tasks().iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(runnable, vec!["c"]);
    }

    #[test]
    fn test_acyclic_graph_passes_cycle_check() {
        assert!(!chain_uow().has_circular_dependencies());
    }

    #[test]
    fn test_direct_cycle_detected() {
        let uow = UnitOfWork::new(
            JourneyStage::Sandbox,
            "acme",
            vec![
                Task::new("a", "a", "agent", "x").with_depends_on(vec!["b".to_string()]),
                Task::new("b", "b", "agent", "x").with_depends_on(vec!["a".to_string()]),
            ],
        );
        assert!(uow.has_circular_dependencies());
    }

    #[test]
    fn test_self_cycle_detected() {
        let uow = UnitOfWork::new(
            JourneyStage::Sandbox,
            "acme",
            vec![Task::new("a", "a", "agent", "x").with_depends_on(vec!["a".to_string()])],
        );
        assert!(uow.has_circular_dependencies());
    }

    #[test]
    fn test_serde_roundtrip() {
        let uow = chain_uow();
        let json = serde_json::to_string(&uow).unwrap();
        let back: UnitOfWork = serde_json::from_str(&json).unwrap();
        assert_eq!(uow, back);

        let raw: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(raw["status"], "pending");
        assert_eq!(raw["stage"], "sandbox");
        // Unset optional fields stay off the wire
        assert!(raw.get("failed_task_id").is_none());
    }
}
