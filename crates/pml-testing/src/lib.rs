// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Testing utilities for PML.
//!
//! - [`MockTransport`]: configurable tool transport with call history,
//!   scripted failures, and per-tool handlers.
//! - [`MockOracle`]: capability oracle with canned candidates, replan
//!   augmentations, and predictions.
//! - [`ScriptedRuntime`]: a line-oriented sandbox runtime that exercises the
//!   capability broker, for isolation and retry tests.
//! - [`RecordingTraceStore`]: trace store that records instead of shipping.
//! - [`collect_run`]: drive a workflow run while collecting its events.

mod mock_oracle;
mod mock_transport;
mod recording_store;
mod scripted_runtime;

pub use mock_oracle::MockOracle;
pub use mock_transport::{MockTransport, ToolHandler};
pub use recording_store::RecordingTraceStore;
pub use scripted_runtime::ScriptedRuntime;

use pml::events::ExecutionEvent;
use pml::executor::WorkflowRun;
use pml::state::WorkflowState;

/// Drive a run to completion, returning every emitted event alongside the
/// final result.
pub async fn collect_run(
    run: WorkflowRun,
) -> (Vec<ExecutionEvent>, pml::Result<WorkflowState>) {
    let (_, events, _, handle) = run.into_parts();
    let collector = tokio::spawn(events.collect());
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(pml::Error::Internal(format!("workflow task failed: {e}"))),
    };
    let events = collector.await.unwrap_or_default();
    (events, result)
}

/// The `type` discriminators of a slice of events, for order assertions.
pub fn event_types(events: &[ExecutionEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            ExecutionEvent::WorkflowStart { .. } => "workflow_start",
            ExecutionEvent::LayerStart { .. } => "layer_start",
            ExecutionEvent::TaskStart { .. } => "task_start",
            ExecutionEvent::TaskComplete { .. } => "task_complete",
            ExecutionEvent::TaskWarning { .. } => "task_warning",
            ExecutionEvent::TaskError { .. } => "task_error",
            ExecutionEvent::StateUpdated { .. } => "state_updated",
            ExecutionEvent::Checkpoint { .. } => "checkpoint",
            ExecutionEvent::DecisionRequired { .. } => "decision_required",
            ExecutionEvent::WorkflowComplete { .. } => "workflow_complete",
        })
        .collect()
}
