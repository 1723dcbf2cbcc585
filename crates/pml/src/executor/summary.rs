// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Human-readable gate summaries.

use crate::graph::TaskGraph;
use crate::state::WorkflowState;
use crate::task::TaskStatus;

/// Templated paragraph shown at a human-in-the-loop gate: what the layer
/// just did and what the next layer will do.
pub(crate) fn hil_summary(graph: &TaskGraph, state: &WorkflowState, layer_index: usize) -> String {
    let completed: Vec<String> = graph.layers()[layer_index]
        .iter()
        .map(|id| {
            let status = state
                .task_result(id)
                .map(|r| match r.status {
                    TaskStatus::Success => "succeeded",
                    TaskStatus::Error => "failed",
                    TaskStatus::FailedSafe => "failed (safe)",
                    TaskStatus::Skipped => "skipped",
                })
                .unwrap_or("pending");
            format!("'{id}' {status}")
        })
        .collect();

    let mut text = format!(
        "Layer {layer_index} finished: {}.",
        if completed.is_empty() {
            "no tasks ran".to_string()
        } else {
            completed.join(", ")
        }
    );

    match graph.layers().get(layer_index + 1) {
        Some(next) if !next.is_empty() => {
            let preview: Vec<String> = next
                .iter()
                .map(|id| match graph.task(id).and_then(|t| t.tool()) {
                    Some(tool) => format!("'{id}' ({tool})"),
                    None => format!("'{id}' (code)"),
                })
                .collect();
            text.push_str(&format!(" Next layer: {}.", preview.join(", ")));
        }
        _ => text.push_str(" This was the final layer."),
    }
    text.push_str(" Approve to continue or deny to abort.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Sanitizer;
    use crate::state::{reduce, StateUpdate};
    use crate::task::{Task, TaskResult};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn summary_names_completed_work_and_next_layer() {
        let graph = TaskGraph::new(vec![
            Task::tool_call("fetch", "http:get"),
            Task::code_exec("parse", "parse()").depends_on(["fetch"]),
            Task::tool_call("push", "github:push").depends_on(["parse"]),
        ])
        .unwrap();

        let sanitizer = Sanitizer::new();
        let state = WorkflowState::new("wf", BTreeMap::new(), &sanitizer);
        let state = reduce(
            &state,
            &StateUpdate::for_layer(0)
                .record(TaskResult::success("fetch", json!({}), 3), &sanitizer),
        );

        let text = hil_summary(&graph, &state, 0);
        assert!(text.contains("'fetch' succeeded"));
        assert!(text.contains("'parse' (code)"));
        assert!(text.contains("Approve to continue"));

        let text = hil_summary(&graph, &state, 2);
        assert!(text.contains("final layer"));
    }

    #[test]
    fn failed_safe_and_skipped_states_are_described() {
        let graph = TaskGraph::new(vec![
            Task::code_exec("a", "x"),
            Task::tool_call("b", "t:u"),
        ])
        .unwrap();
        let sanitizer = Sanitizer::new();
        let state = WorkflowState::new("wf", BTreeMap::new(), &sanitizer);
        let state = reduce(
            &state,
            &StateUpdate::for_layer(0)
                .record(
                    TaskResult::failed_safe(
                        "a",
                        crate::error::TaskError::new(crate::error::ErrorKind::Runtime, "boom"),
                        1,
                    ),
                    &sanitizer,
                )
                .record(TaskResult::skipped("b", "a"), &sanitizer),
        );

        let text = hil_summary(&graph, &state, 0);
        assert!(text.contains("'a' failed (safe)"));
        assert!(text.contains("'b' skipped"));
    }
}
