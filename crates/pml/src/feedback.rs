// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Trace assembly and publication to the external learning store.
//!
//! Publication is fire-and-forget: a failed publish is logged and swallowed,
//! never surfaced to the workflow. The learning loop is an optimization, not
//! a dependency.

use crate::error::Result;
use crate::exploration::PathTrace;
use crate::graph::TaskGraph;
use crate::state::WorkflowState;
use crate::task::{TaskResult, TaskKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A completed execution record for the learning store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub workflow_id: String,
    /// Caller-provided intent. Never synthesized; absent stays absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_text: Option<String>,
    /// Structural summary of the executed DAG.
    pub dag: Value,
    pub task_results: Vec<TaskResult>,
    pub total_duration_ms: u64,
    pub success: bool,
    pub initial_context_sanitized: BTreeMap<String, Value>,
    pub exploratory: bool,
    /// Fraction of results that were mocked, in [0, 1].
    pub mock_ratio: f64,
}

impl Trace {
    /// Build a trace for a completed workflow.
    pub fn from_workflow(
        state: &WorkflowState,
        graph: &TaskGraph,
        total_duration_ms: u64,
        intent_text: Option<String>,
    ) -> Self {
        let mocked = state.tasks.iter().filter(|r| r.mocked).count();
        let mock_ratio = if state.tasks.is_empty() {
            0.0
        } else {
            mocked as f64 / state.tasks.len() as f64
        };
        Self {
            workflow_id: state.workflow_id.clone(),
            intent_text,
            dag: dag_summary(graph),
            task_results: state.tasks.clone(),
            total_duration_ms,
            success: state.failed_tasks() == 0,
            initial_context_sanitized: state.initial_context.clone(),
            exploratory: false,
            mock_ratio,
        }
    }

    /// Build a trace for one exploratory path walk.
    pub fn from_path(path: &PathTrace, intent_text: Option<String>) -> Self {
        Self {
            workflow_id: format!("explore-{}", path.path_id),
            intent_text,
            dag: json!({
                "path_id": path.path_id,
                "steps": path.steps.iter().map(|s| s.task_id.clone()).collect::<Vec<_>>(),
                "confidence": path.confidence,
                "viable": path.viable,
            }),
            task_results: path.steps.clone(),
            total_duration_ms: path.total_duration_ms,
            success: path.viable,
            initial_context_sanitized: BTreeMap::new(),
            exploratory: true,
            mock_ratio: path.mock_ratio,
        }
    }
}

/// Structural DAG summary carried in traces: id, kind, tool, dependencies.
fn dag_summary(graph: &TaskGraph) -> Value {
    let tasks: Vec<Value> = graph
        .tasks()
        .map(|task| {
            let (kind, tool) = match &task.kind {
                TaskKind::ToolCall { tool } => ("tool_call", Some(tool.clone())),
                TaskKind::CodeExec { .. } => ("code_exec", None),
            };
            json!({
                "id": task.id,
                "kind": kind,
                "tool": tool,
                "depends_on": task.depends_on.iter().cloned().collect::<Vec<_>>(),
                "side_effects": task.side_effects,
            })
        })
        .collect();
    json!({ "tasks": tasks, "layers": graph.layers() })
}

/// External learning-store contract.
#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn publish(&self, trace: Trace) -> Result<()>;
}

/// Fire-and-forget publisher over a [`TraceStore`].
#[derive(Clone)]
pub struct FeedbackPublisher {
    store: Arc<dyn TraceStore>,
}

impl FeedbackPublisher {
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self { store }
    }

    /// Spawn the publish; failures are logged and dropped.
    pub fn publish(&self, trace: Trace) {
        let store = Arc::clone(&self.store);
        let workflow_id = trace.workflow_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.publish(trace).await {
                tracing::warn!(%workflow_id, error = %e, "trace publication failed");
            }
        });
    }

    /// Publish and wait. Used by tests and by embedders that flush on
    /// shutdown.
    pub async fn publish_now(&self, trace: Trace) -> Result<()> {
        self.store.publish(trace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sanitize::Sanitizer;
    use crate::state::{reduce, StateUpdate};
    use crate::task::Task;
    use parking_lot::Mutex;

    struct RecordingStore {
        traces: Mutex<Vec<Trace>>,
        fail: bool,
    }

    impl RecordingStore {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                traces: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl TraceStore for RecordingStore {
        async fn publish(&self, trace: Trace) -> Result<()> {
            if self.fail {
                return Err(Error::Transport("learning store down".into()));
            }
            self.traces.lock().push(trace);
            Ok(())
        }
    }

    fn sample_state() -> (WorkflowState, TaskGraph) {
        let sanitizer = Sanitizer::new();
        let graph = TaskGraph::new(vec![
            Task::tool_call("a", "fs:read_file"),
            Task::tool_call("b", "llm:summarize").depends_on(["a"]),
        ])
        .unwrap();
        let state = WorkflowState::new("wf-1", BTreeMap::new(), &sanitizer);
        let state = reduce(
            &state,
            &StateUpdate::for_layer(1)
                .record(TaskResult::success("a", json!({"ok": 1}), 4), &sanitizer)
                .record(TaskResult::success("b", json!({"ok": 2}), 9), &sanitizer),
        );
        (state, graph)
    }

    #[test]
    fn workflow_trace_carries_dag_and_results() {
        let (state, graph) = sample_state();
        let trace = Trace::from_workflow(&state, &graph, 42, Some("summarize it".into()));

        assert_eq!(trace.workflow_id, "wf-1");
        assert!(trace.success);
        assert!(!trace.exploratory);
        assert_eq!(trace.task_results.len(), 2);
        assert_eq!(trace.total_duration_ms, 42);
        assert_eq!(trace.dag["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(trace.dag["layers"], json!([["a"], ["b"]]));
    }

    #[test]
    fn absent_intent_is_not_serialized() {
        let (state, graph) = sample_state();
        let trace = Trace::from_workflow(&state, &graph, 1, None);
        let encoded = serde_json::to_value(&trace).unwrap();
        assert!(encoded.get("intent_text").is_none());
    }

    #[test]
    fn path_trace_is_marked_exploratory() {
        let path = PathTrace {
            path_id: "p1".into(),
            steps: vec![TaskResult::success("s1", json!(1), 0).mocked()],
            viable: true,
            failure_step: None,
            confidence: 0.7,
            mock_ratio: 1.0,
            total_duration_ms: 5,
        };
        let trace = Trace::from_path(&path, None);
        assert!(trace.exploratory);
        assert!((trace.mock_ratio - 1.0).abs() < f64::EPSILON);
        assert!(trace.success);
    }

    #[tokio::test]
    async fn publish_now_round_trips() {
        let store = RecordingStore::new(false);
        let publisher = FeedbackPublisher::new(store.clone());
        let (state, graph) = sample_state();
        publisher
            .publish_now(Trace::from_workflow(&state, &graph, 1, None))
            .await
            .unwrap();
        assert_eq!(store.traces.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_publication_is_swallowed() {
        let store = RecordingStore::new(true);
        let publisher = FeedbackPublisher::new(store);
        let (state, graph) = sample_state();

        // Must not panic or propagate.
        publisher.publish(Trace::from_workflow(&state, &graph, 1, None));
        tokio::task::yield_now().await;
    }
}
