// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Capability oracle contract.
//!
//! The oracle is the external planner: it expands intents into candidate
//! paths, augments a running DAG on replan, and predicts likely next
//! capabilities after completion. Its internals (semantic search, graph
//! search, ranking) are out of scope; the engine consumes only this trait.

use crate::error::Result;
use crate::graph::TaskGraph;
use crate::state::WorkflowState;
use crate::task::{ArgSpec, Task, TaskResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One step of a candidate path proposed for exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStep {
    /// Step id, unique within its path; references resolve against it.
    pub id: String,
    /// Tool identifier ("server:name").
    pub tool: String,
    /// Argument specs; references point at earlier step ids.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgSpec>,
    /// Explicit mock output to use when the step cannot run for real.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<Value>,
    /// Declared output schema, used to derive a default mock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl CandidateStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            arguments: BTreeMap::new(),
            mock: None,
            output_schema: None,
        }
    }

    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, spec: ArgSpec) -> Self {
        self.arguments.insert(name.into(), spec);
        self
    }

    #[must_use]
    pub fn with_mock(mut self, mock: Value) -> Self {
        self.mock = Some(mock);
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

/// A ranked hypothetical path for exploratory execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePath {
    pub id: String,
    pub steps: Vec<CandidateStep>,
    /// Historical success rate of this path shape, in [0, 1].
    #[serde(default)]
    pub historical_success: f64,
}

impl CandidatePath {
    pub fn new(id: impl Into<String>, steps: Vec<CandidateStep>) -> Self {
        Self {
            id: id.into(),
            steps,
            historical_success: 0.0,
        }
    }

    #[must_use]
    pub fn with_historical_success(mut self, rate: f64) -> Self {
        self.historical_success = rate.clamp(0.0, 1.0);
        self
    }
}

/// A predicted next call, speculated after workflow completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedCall {
    /// Tool or capability id.
    pub tool: String,
    /// Argument specs resolved against the completed workflow's state.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgSpec>,
}

/// Compact view of a finished workflow handed to the oracle for prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub success: bool,
    pub executed_tools: Vec<String>,
    pub context: BTreeMap<String, Value>,
}

impl WorkflowSummary {
    pub fn from_state(state: &WorkflowState, tools: Vec<String>) -> Self {
        Self {
            workflow_id: state.workflow_id.clone(),
            success: state.failed_tasks() == 0,
            executed_tools: tools,
            context: state.context.clone(),
        }
    }
}

/// External planner contract.
#[async_trait]
pub trait CapabilityOracle: Send + Sync {
    /// Candidate paths for an intent with no matching capability, best first.
    async fn find_candidates(&self, intent: &str, context: &Value) -> Result<Vec<CandidatePath>>;

    /// Tasks to append to a running DAG for a new requirement. An empty
    /// vector means the requirement needs no new work.
    async fn augment_dag(
        &self,
        dag: &TaskGraph,
        completed: &[TaskResult],
        new_requirement: &str,
        context: &Value,
    ) -> Result<Vec<Task>>;

    /// Likely next capabilities after a completed workflow, best first.
    async fn next_capabilities(&self, summary: &WorkflowSummary) -> Result<Vec<PredictedCall>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_step_round_trips() {
        let step = CandidateStep::new("s1", "fs:read_file")
            .with_arg("path", ArgSpec::literal(json!("/a")))
            .with_output_schema(json!({"type": "object"}));
        let encoded = serde_json::to_string(&step).unwrap();
        let decoded: CandidateStep = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, step);
    }

    #[test]
    fn historical_success_is_clamped() {
        let path = CandidatePath::new("p", vec![]).with_historical_success(3.0);
        assert!((path.historical_success - 1.0).abs() < f64::EPSILON);
    }
}
