// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Workflow state and its reducers.
//!
//! [`WorkflowState`] is the canonical handle for checkpoint and resume. The
//! executor owns the only mutable copy and never writes fields directly: it
//! builds [`StateUpdate`] values and applies them through [`reduce`], a pure
//! function. Every transition is therefore unit-testable in isolation.
//!
//! Reducer rules:
//! - `current_layer` takes the max of old and update.
//! - `tasks` and `context` are keyed by task id with last-write-wins.
//! - `decisions` concatenates.
//! - `replan_count` is monotonic.

use crate::events::DecisionKind;
use crate::sanitize::Sanitizer;
use crate::task::{TaskId, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A recorded control-plane decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    pub timestamp: DateTime<Utc>,
    /// What happened: `continue`, `approved`, `denied`, `replan`, `timeout`.
    pub outcome: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Decision {
    pub fn new(kind: DecisionKind, outcome: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            outcome: outcome.into(),
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The canonical, serializable state of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    /// Caller-supplied parameters, sanitized on write.
    pub initial_context: BTreeMap<String, Value>,
    /// Highest layer index that has been fully processed plus one while
    /// running; monotonically non-decreasing.
    pub current_layer: usize,
    /// Task results keyed by task id, last-write-wins on rerun.
    pub tasks: Vec<TaskResult>,
    /// Control-plane decisions in the order they were taken.
    pub decisions: Vec<Decision>,
    /// Sanitized task outputs available for argument resolution.
    pub context: BTreeMap<TaskId, Value>,
    pub replan_count: u32,
}

impl WorkflowState {
    /// Create fresh state for a new workflow. The initial context is
    /// sanitized on the way in.
    pub fn new(
        workflow_id: impl Into<String>,
        initial_context: BTreeMap<String, Value>,
        sanitizer: &Sanitizer,
    ) -> Self {
        let initial_context = initial_context
            .into_iter()
            .map(|(k, v)| (k, sanitizer.sanitize(&v)))
            .collect();
        Self {
            workflow_id: workflow_id.into(),
            initial_context,
            current_layer: 0,
            tasks: Vec::new(),
            decisions: Vec::new(),
            context: BTreeMap::new(),
            replan_count: 0,
        }
    }

    /// Latest result recorded for a task, if any.
    pub fn task_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task_id == task_id)
    }

    pub fn has_result(&self, task_id: &str) -> bool {
        self.task_result(task_id).is_some()
    }

    pub fn successful_tasks(&self) -> usize {
        self.tasks.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_tasks(&self) -> usize {
        self.tasks.iter().filter(|r| !r.is_success()).count()
    }
}

/// A batched state transition produced by the executor.
///
/// Values placed in `context` must already be sanitized; the executor builds
/// updates through [`StateUpdate::record`] which enforces that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Layer the update belongs to; reduces via max.
    pub layer: Option<usize>,
    pub task_results: Vec<TaskResult>,
    pub decisions: Vec<Decision>,
    pub context: BTreeMap<TaskId, Value>,
    /// Number of replans accepted in this transition (0 or 1 in practice).
    pub replan_increment: u32,
}

impl StateUpdate {
    pub fn for_layer(layer: usize) -> Self {
        Self {
            layer: Some(layer),
            ..Self::default()
        }
    }

    /// Record a task result, sanitizing its output into resolution context.
    #[must_use]
    pub fn record(mut self, result: TaskResult, sanitizer: &Sanitizer) -> Self {
        if let Some(output) = &result.output {
            self.context
                .insert(result.task_id.clone(), sanitizer.sanitize(output));
        }
        self.task_results.push(result);
        self
    }

    #[must_use]
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decisions.push(decision);
        self
    }

    #[must_use]
    pub fn with_replan(mut self) -> Self {
        self.replan_increment += 1;
        self
    }

    /// Attach an auxiliary context entry, e.g. sandbox `state` carried for
    /// checkpoint continuity of multi-step code tasks.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<TaskId>, value: Value, sanitizer: &Sanitizer) -> Self {
        self.context.insert(key.into(), sanitizer.sanitize(&value));
        self
    }
}

/// Pure reducer over workflow state.
///
/// Applying the same update twice is a no-op for the keyed collections
/// (`tasks`, `context`); `decisions` appends and `replan_increment` adds, so
/// callers apply each update exactly once.
pub fn reduce(state: &WorkflowState, update: &StateUpdate) -> WorkflowState {
    let mut next = state.clone();

    if let Some(layer) = update.layer {
        next.current_layer = next.current_layer.max(layer);
    }

    for result in &update.task_results {
        match next.tasks.iter_mut().find(|r| r.task_id == result.task_id) {
            Some(existing) => *existing = result.clone(),
            None => next.tasks.push(result.clone()),
        }
    }

    next.decisions.extend(update.decisions.iter().cloned());

    for (task_id, value) in &update.context {
        next.context.insert(task_id.clone(), value.clone());
    }

    next.replan_count += update.replan_increment;
    next
}
