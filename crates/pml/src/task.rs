// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Task data model.
//!
//! A [`Task`] is the unit of work in a workflow DAG: either a tool call
//! against an MCP server or a sandboxed code execution. Tasks are immutable
//! once admitted into a graph; results are reported separately as
//! [`TaskResult`] values.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a task, unique within a workflow.
pub type TaskId = String;

/// What a task executes. Tagged variants rather than virtual dispatch: the
/// executor needs to route on the kind, and the wire format carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Invoke an MCP tool. `tool` is an opaque "server:name" identifier.
    ToolCall { tool: String },
    /// Run source text in the sandbox.
    CodeExec { code: String },
}

/// Decision gate attached to a task's layer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointGate {
    /// No gate.
    #[default]
    None,
    /// Agent-in-the-loop decision point.
    Ail,
    /// Human-in-the-loop decision point.
    Hil,
}

/// How a single argument is produced at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgSpec {
    /// A fixed JSON value.
    Literal { value: Value },
    /// A projection out of a prior task's output. The referenced task must be
    /// in the task's `depends_on` set; graph validation rejects otherwise.
    Reference { task_id: TaskId, json_path: String },
    /// A lookup in the workflow's initial context.
    Parameter { name: String },
}

impl ArgSpec {
    pub fn literal(value: impl Into<Value>) -> Self {
        ArgSpec::Literal {
            value: value.into(),
        }
    }

    pub fn reference(task_id: impl Into<TaskId>, json_path: impl Into<String>) -> Self {
        ArgSpec::Reference {
            task_id: task_id.into(),
            json_path: json_path.into(),
        }
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        ArgSpec::Parameter { name: name.into() }
    }
}

/// A unit of work in the DAG.
///
/// # Example
///
/// ```rust
/// use pml::task::{ArgSpec, Task};
///
/// let read = Task::tool_call("read", "fs:read_file")
///     .with_arg("path", ArgSpec::parameter("input_path"));
/// let summarize = Task::tool_call("summarize", "llm:summarize")
///     .with_arg("text", ArgSpec::reference("read", "content"))
///     .depends_on(["read"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the workflow.
    pub id: TaskId,
    /// Tool call or code execution.
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Argument specs, resolved just before execution.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgSpec>,
    /// Ids of tasks that must complete first.
    #[serde(default)]
    pub depends_on: BTreeSet<TaskId>,
    /// When true the task is never speculated, never retried, and its failure
    /// is fatal to the workflow.
    #[serde(default)]
    pub side_effects: bool,
    /// Ordering hint within a layer; lower runs first.
    #[serde(default)]
    pub priority: i32,
    /// Decision gate requested after this task's layer.
    #[serde(default)]
    pub checkpoint: CheckpointGate,
}

impl Task {
    /// Create a tool-call task.
    pub fn tool_call(id: impl Into<TaskId>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::ToolCall { tool: tool.into() },
            arguments: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            side_effects: false,
            priority: 0,
            checkpoint: CheckpointGate::None,
        }
    }

    /// Create a code-execution task.
    pub fn code_exec(id: impl Into<TaskId>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TaskKind::CodeExec { code: code.into() },
            arguments: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            side_effects: false,
            priority: 0,
            checkpoint: CheckpointGate::None,
        }
    }

    /// Add an argument spec.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, spec: ArgSpec) -> Self {
        self.arguments.insert(name.into(), spec);
        self
    }

    /// Declare dependencies.
    #[must_use]
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Mark the task as side-effecting.
    #[must_use]
    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = true;
        self
    }

    /// Set the within-layer priority; lower runs first.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Request a decision gate after this task's layer.
    #[must_use]
    pub fn with_checkpoint(mut self, gate: CheckpointGate) -> Self {
        self.checkpoint = gate;
        self
    }

    /// Tool identifier for tool-call tasks, `None` for code tasks.
    pub fn tool(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::ToolCall { tool } => Some(tool),
            TaskKind::CodeExec { .. } => None,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self.kind, TaskKind::CodeExec { .. })
    }
}

/// Terminal status of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Completed and produced output.
    Success,
    /// Failed; for side-effecting tasks this halts the workflow.
    Error,
    /// A safe-to-fail code task exhausted its retries; the workflow continues.
    FailedSafe,
    /// Never ran because a dependency errored.
    Skipped,
}

/// Outcome of a single task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Output JSON on success, `None` otherwise.
    pub output: Option<Value>,
    /// Structured error when not successful.
    pub error: Option<TaskError>,
    pub duration_ms: u64,
    /// Set when the exploratory executor substituted a mock.
    #[serde(default)]
    pub mocked: bool,
    /// Set when the output was served from the speculation cache.
    #[serde(default)]
    pub from_cache: bool,
}

impl TaskResult {
    pub fn success(task_id: impl Into<TaskId>, output: Value, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Success,
            output: Some(output),
            error: None,
            duration_ms,
            mocked: false,
            from_cache: false,
        }
    }

    pub fn error(task_id: impl Into<TaskId>, error: TaskError, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Error,
            output: None,
            error: Some(error),
            duration_ms,
            mocked: false,
            from_cache: false,
        }
    }

    pub fn failed_safe(task_id: impl Into<TaskId>, error: TaskError, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::FailedSafe,
            output: None,
            error: Some(error),
            duration_ms,
            mocked: false,
            from_cache: false,
        }
    }

    /// Result for a task that never ran because a dependency errored.
    pub fn skipped(task_id: impl Into<TaskId>, dependency: &str) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Skipped,
            output: None,
            error: Some(TaskError::new(
                crate::error::ErrorKind::Runtime,
                format!("skipped: dependency '{dependency}' failed"),
            )),
            duration_ms: 0,
            mocked: false,
            from_cache: false,
        }
    }

    /// Flag the result as served from the speculation cache.
    #[must_use]
    pub fn from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Flag the result as a mock substitution.
    #[must_use]
    pub fn mocked(mut self) -> Self {
        self.mocked = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_kind_serializes_with_kind_tag() {
        let task = Task::tool_call("a", "fs:read_file");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "tool_call");
        assert_eq!(json["tool"], "fs:read_file");

        let task = Task::code_exec("b", "return 1");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "code_exec");
        assert_eq!(json["code"], "return 1");
    }

    #[test]
    fn arg_spec_serializes_with_type_tag() {
        let spec = ArgSpec::reference("read", "content");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "reference");
        assert_eq!(json["task_id"], "read");
        assert_eq!(json["json_path"], "content");
    }

    #[test]
    fn task_round_trips_through_json() {
        let task = Task::tool_call("summarize", "llm:summarize")
            .with_arg("text", ArgSpec::reference("read", "content"))
            .with_arg("style", ArgSpec::literal(json!("terse")))
            .depends_on(["read"])
            .with_priority(-1)
            .with_checkpoint(CheckpointGate::Hil);

        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn defaults_apply_when_fields_absent() {
        let task: Task = serde_json::from_value(json!({
            "id": "t",
            "kind": "tool_call",
            "tool": "fs:stat",
        }))
        .unwrap();
        assert!(!task.side_effects);
        assert_eq!(task.priority, 0);
        assert_eq!(task.checkpoint, CheckpointGate::None);
        assert!(task.arguments.is_empty());
    }

    #[test]
    fn skipped_result_names_the_failed_dependency() {
        let result = TaskResult::skipped("downstream", "upstream");
        assert_eq!(result.status, TaskStatus::Skipped);
        assert!(result.output.is_none());
        let err = result.error.unwrap();
        assert!(err.message.contains("upstream"));
    }

    #[test]
    fn success_result_has_no_error() {
        let result = TaskResult::success("t", json!({"ok": true}), 12);
        assert!(result.is_success());
        assert!(result.error.is_none());
        assert_eq!(result.duration_ms, 12);
    }
}
