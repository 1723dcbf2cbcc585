// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The per-workflow execution loop.
//!
//! One runner owns one workflow: the graph, the state, the command queue,
//! and the event stream. The loop per layer: drain commands, run the layer's
//! tasks in parallel, reduce the results into state, checkpoint, service the
//! decision gates, then fire speculation for the next layer and advance.
//!
//! Ordering guarantees kept here: `task_start(t)` precedes
//! `task_complete(t)`; every completion of layer i precedes the first start
//! of layer i+1; `state_updated` for a layer precedes its `checkpoint`.

use super::{AilMode, ExecutorConfig, HilMode};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::command::{Command, CommandQueue};
use crate::constants::{MAX_RETRY_ATTEMPTS, RETRY_BACKOFF_BASE};
use crate::error::{Error, ErrorKind, Result, TaskError};
use crate::events::{DecisionKind, EventStream, ExecutionEvent};
use crate::feedback::{FeedbackPublisher, Trace};
use crate::graph::TaskGraph;
use crate::invoker::ToolInvoker;
use crate::oracle::CapabilityOracle;
use crate::resolver::resolve_arguments_lenient;
use crate::safety::SafetyOracle;
use crate::sandbox::SandboxExecutor;
use crate::sanitize::Sanitizer;
use crate::speculation::{fingerprint, SpeculativeExecutor};
use crate::state::{reduce, Decision, StateUpdate, WorkflowState};
use crate::task::{CheckpointGate, Task, TaskId, TaskKind, TaskResult, TaskStatus};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) struct WorkflowRunner {
    pub(crate) graph: TaskGraph,
    pub(crate) state: WorkflowState,
    pub(crate) start_layer: usize,
    pub(crate) intent: Option<String>,
    pub(crate) events: Arc<EventStream>,
    pub(crate) commands: CommandQueue,
    pub(crate) invoker: Arc<ToolInvoker>,
    pub(crate) safety: SafetyOracle,
    pub(crate) sanitizer: Sanitizer,
    pub(crate) config: ExecutorConfig,
    pub(crate) checkpoints: Option<Arc<dyn CheckpointStore>>,
    pub(crate) publisher: Option<FeedbackPublisher>,
    pub(crate) oracle: Option<Arc<dyn CapabilityOracle>>,
    pub(crate) sandbox: Option<Arc<SandboxExecutor>>,
    pub(crate) speculator: Option<SpeculativeExecutor>,
}

/// Everything a spawned task needs, detached from the runner's lifetime.
struct TaskContext {
    workflow_id: String,
    events: Arc<EventStream>,
    invoker: Arc<ToolInvoker>,
    safety: SafetyOracle,
    sandbox: Option<Arc<SandboxExecutor>>,
    speculator: Option<SpeculativeExecutor>,
    state: WorkflowState,
}

impl WorkflowRunner {
    pub(crate) async fn run(mut self) -> Result<WorkflowState> {
        let started = Instant::now();
        let workflow_id = self.state.workflow_id.clone();
        tracing::info!(
            %workflow_id,
            tasks = self.graph.len(),
            layers = self.graph.layers().len(),
            start_layer = self.start_layer,
            "workflow starting"
        );

        self.events
            .emit(ExecutionEvent::WorkflowStart {
                timestamp: Utc::now(),
                workflow_id: workflow_id.clone(),
                total_tasks: self.graph.len(),
                total_layers: self.graph.layers().len(),
            })
            .await;

        match self.run_layers().await {
            Ok(()) => {
                let total_time_ms = started.elapsed().as_millis() as u64;
                let last_layer = self.graph.layers().len().saturating_sub(1);
                self.save_checkpoint(last_layer, true).await;
                self.events
                    .emit(ExecutionEvent::WorkflowComplete {
                        timestamp: Utc::now(),
                        workflow_id: workflow_id.clone(),
                        total_time_ms,
                        successful_tasks: self.state.successful_tasks(),
                        failed_tasks: self.state.failed_tasks(),
                    })
                    .await;
                self.events.close();

                self.publish_trace(total_time_ms);
                self.predict_next();
                self.prune_checkpoints();
                tracing::info!(%workflow_id, total_time_ms, "workflow complete");
                Ok(self.state)
            }
            Err(e) => {
                tracing::error!(%workflow_id, error = %e, "workflow terminated");
                self.events.close();
                Err(e)
            }
        }
    }

    async fn run_layers(&mut self) -> Result<()> {
        let mut layer_index = self.start_layer;
        while layer_index < self.graph.layers().len() {
            let pending: Vec<TaskId> = self.graph.layers()[layer_index]
                .iter()
                .filter(|id| !self.state.has_result(id))
                .cloned()
                .collect();

            self.events
                .emit(ExecutionEvent::LayerStart {
                    timestamp: Utc::now(),
                    workflow_id: self.state.workflow_id.clone(),
                    layer_index,
                    task_ids: pending.clone(),
                })
                .await;

            for command in self.commands.drain() {
                match command {
                    Command::Abort { reason } => {
                        tracing::warn!(%reason, "workflow aborted at layer boundary");
                        return Err(Error::Aborted(reason));
                    }
                    Command::ReplanDag {
                        new_requirement,
                        available_context,
                    } => {
                        self.handle_replan(&new_requirement, available_context, layer_index)
                            .await?;
                    }
                    other => {
                        tracing::debug!(command = ?other, "command ignored outside a decision point");
                    }
                }
            }

            let outcomes = self.run_layer_tasks(&pending).await?;
            let had_errors = outcomes
                .iter()
                .any(|(result, _)| result.status == TaskStatus::Error);

            let mut update = StateUpdate::for_layer(layer_index);
            for (result, code_state) in outcomes {
                if let Some(code_state) = code_state {
                    update = update.with_context(
                        format!("{}::state", result.task_id),
                        code_state,
                        &self.sanitizer,
                    );
                }
                update = update.record(result, &self.sanitizer);
            }
            self.state = reduce(&self.state, &update);
            self.events
                .emit(ExecutionEvent::StateUpdated {
                    timestamp: Utc::now(),
                    workflow_id: self.state.workflow_id.clone(),
                    layer_index,
                })
                .await;

            self.save_checkpoint(layer_index, false).await;

            self.ail_gate(layer_index, had_errors).await?;
            self.hil_gate(layer_index).await?;

            self.trigger_speculation(layer_index + 1);

            layer_index += 1;
        }
        Ok(())
    }

    /// Run one layer's pending tasks in parallel, bounded by
    /// `config.max_parallel`. Returns each task's result plus any sandbox
    /// state to carry forward. A fatal failure cancels the layer's in-flight
    /// tasks and propagates.
    async fn run_layer_tasks(
        &mut self,
        pending: &[TaskId],
    ) -> Result<Vec<(TaskResult, Option<Value>)>> {
        let mut outcomes: Vec<(TaskResult, Option<Value>)> = Vec::new();
        let permits = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut join_set: JoinSet<(TaskResult, Option<Value>, bool)> = JoinSet::new();

        for id in pending {
            let task = self
                .graph
                .task(id)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("layer names unknown task '{id}'")))?;

            // Dependency failure propagation: error or skipped upstream means
            // this task never runs. A failed_safe upstream still runs it.
            let failed_dep = task.depends_on.iter().find(|dep| {
                matches!(
                    self.state.task_result(dep).map(|r| r.status),
                    Some(TaskStatus::Error) | Some(TaskStatus::Skipped)
                )
            });
            if let Some(dep) = failed_dep {
                self.events
                    .emit(ExecutionEvent::TaskWarning {
                        timestamp: Utc::now(),
                        workflow_id: self.state.workflow_id.clone(),
                        task_id: task.id.clone(),
                        message: format!("skipped: dependency '{dep}' did not succeed"),
                    })
                    .await;
                outcomes.push((TaskResult::skipped(&task.id, dep), None));
                continue;
            }

            let deps: BTreeMap<TaskId, TaskResult> = task
                .depends_on
                .iter()
                .filter_map(|dep| {
                    self.state
                        .task_result(dep)
                        .map(|r| (dep.clone(), r.clone()))
                })
                .collect();

            let ctx = TaskContext {
                workflow_id: self.state.workflow_id.clone(),
                events: Arc::clone(&self.events),
                invoker: Arc::clone(&self.invoker),
                safety: self.safety.clone(),
                sandbox: self.sandbox.clone(),
                speculator: self.speculator.clone(),
                state: self.state.clone(),
            };
            let permits = Arc::clone(&permits);
            join_set.spawn(async move { execute_task(ctx, task, deps, permits).await });
        }

        let mut fatal: Option<Error> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((result, code_state, side_effects)) => {
                    let is_fatal = side_effects && result.status == TaskStatus::Error;
                    if is_fatal && fatal.is_none() {
                        let error = result
                            .error
                            .clone()
                            .unwrap_or_else(|| TaskError::new(ErrorKind::Runtime, "task failed"));
                        fatal = Some(Error::FatalTask {
                            task_id: result.task_id.clone(),
                            error,
                        });
                    }
                    outcomes.push((result, code_state));
                    if is_fatal {
                        // Cancel the rest of the layer.
                        join_set.shutdown().await;
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    if fatal.is_none() {
                        fatal = Some(Error::Internal(format!("task panicked: {join_err}")));
                        join_set.shutdown().await;
                    }
                }
            }
        }

        match fatal {
            Some(err) => Err(err),
            None => Ok(outcomes),
        }
    }

    async fn save_checkpoint(&mut self, layer_index: usize, finalized: bool) {
        let Some(store) = self.checkpoints.clone() else {
            return;
        };
        let mut checkpoint = Checkpoint::new(
            &self.state.workflow_id,
            layer_index,
            self.state.clone(),
        );
        if finalized {
            checkpoint = checkpoint.finalized();
        }

        let checkpoint_id = match store.save(checkpoint).await {
            Ok(id) => id,
            Err(e) => {
                // Non-fatal: the workflow continues without this snapshot.
                tracing::warn!(
                    workflow_id = %self.state.workflow_id,
                    layer_index,
                    error = %e,
                    "checkpoint save failed"
                );
                format!("failed-L{layer_index}")
            }
        };
        self.events
            .emit(ExecutionEvent::Checkpoint {
                timestamp: Utc::now(),
                workflow_id: self.state.workflow_id.clone(),
                checkpoint_id,
                layer_index,
            })
            .await;
    }

    async fn ail_gate(&mut self, layer_index: usize, had_errors: bool) -> Result<()> {
        let requested_by_task = self.layer_has_gate(layer_index, CheckpointGate::Ail);
        let fire = requested_by_task
            || match self.config.ail {
                AilMode::PerLayer => true,
                AilMode::OnError => had_errors,
                AilMode::Off => false,
            };
        if !fire {
            return Ok(());
        }

        self.events
            .emit(ExecutionEvent::DecisionRequired {
                timestamp: Utc::now(),
                workflow_id: self.state.workflow_id.clone(),
                decision_type: DecisionKind::Ail,
                description: format!(
                    "Layer {layer_index} complete{}. Continue, abort, or replan.",
                    if had_errors { " with errors" } else { "" }
                ),
            })
            .await;

        let decision = match self.commands.next_within(self.config.ail_timeout).await {
            // Default on timeout: keep going.
            None => Decision::new(DecisionKind::Ail, "continue")
                .with_metadata(json!({"timeout": true})),
            Some(Command::Continue) => Decision::new(DecisionKind::Ail, "continue"),
            Some(Command::ApprovalResponse { approved: true, .. }) => {
                Decision::new(DecisionKind::Ail, "continue")
            }
            Some(Command::ApprovalResponse {
                approved: false,
                feedback,
            }) => {
                return Err(Error::Aborted(
                    feedback.unwrap_or_else(|| "denied at agent gate".to_string()),
                ))
            }
            Some(Command::Abort { reason }) => return Err(Error::Aborted(reason)),
            Some(Command::ReplanDag {
                new_requirement,
                available_context,
            }) => {
                let replanned = self
                    .handle_replan(&new_requirement, available_context, layer_index)
                    .await?;
                Decision::new(
                    DecisionKind::Ail,
                    if replanned { "replan" } else { "replan_no_changes" },
                )
                .with_metadata(json!({"new_requirement": new_requirement}))
            }
        };
        self.record_decision(decision);
        Ok(())
    }

    async fn hil_gate(&mut self, layer_index: usize) -> Result<()> {
        let ids = &self.graph.layers()[layer_index];
        let has_side_effects = ids
            .iter()
            .any(|id| self.graph.task(id).map(|t| t.side_effects).unwrap_or(false));
        let requested_by_task = self.layer_has_gate(layer_index, CheckpointGate::Hil);
        let fire = requested_by_task
            || match self.config.hil {
                HilMode::Always => true,
                HilMode::CriticalOnly => has_side_effects,
                HilMode::Off => false,
            };
        if !fire {
            return Ok(());
        }

        let description = super::summary::hil_summary(&self.graph, &self.state, layer_index);
        self.events
            .emit(ExecutionEvent::DecisionRequired {
                timestamp: Utc::now(),
                workflow_id: self.state.workflow_id.clone(),
                decision_type: DecisionKind::Hil,
                description,
            })
            .await;

        match self.commands.next_within(self.config.hil_timeout).await {
            // No answer from a human means stop; continuing unreviewed is the
            // dangerous branch.
            None => Err(Error::Aborted("human approval timed out".to_string())),
            Some(Command::Abort { reason }) => Err(Error::Aborted(reason)),
            Some(Command::ApprovalResponse {
                approved: false,
                feedback,
            }) => Err(Error::Aborted(
                feedback.unwrap_or_else(|| "denied by human reviewer".to_string()),
            )),
            Some(Command::ApprovalResponse {
                approved: true,
                feedback,
            }) => {
                self.record_decision(
                    Decision::new(DecisionKind::Hil, "approved")
                        .with_metadata(json!({"feedback": feedback})),
                );
                Ok(())
            }
            Some(Command::Continue) => {
                self.record_decision(Decision::new(DecisionKind::Hil, "approved"));
                Ok(())
            }
            Some(Command::ReplanDag {
                new_requirement,
                available_context,
            }) => {
                let replanned = self
                    .handle_replan(&new_requirement, available_context, layer_index)
                    .await?;
                self.record_decision(
                    Decision::new(
                        DecisionKind::Hil,
                        if replanned { "replan" } else { "replan_no_changes" },
                    )
                    .with_metadata(json!({"new_requirement": new_requirement})),
                );
                Ok(())
            }
        }
    }

    fn layer_has_gate(&self, layer_index: usize, gate: CheckpointGate) -> bool {
        self.graph.layers()[layer_index]
            .iter()
            .any(|id| self.graph.task(id).map(|t| t.checkpoint == gate).unwrap_or(false))
    }

    /// Accept a replan command: ask the oracle for new tasks and append them
    /// after the current layer. Returns whether the DAG changed.
    async fn handle_replan(
        &mut self,
        new_requirement: &str,
        available_context: Option<Value>,
        layer_index: usize,
    ) -> Result<bool> {
        if self.state.replan_count >= self.config.max_replans {
            tracing::warn!(
                replan_count = self.state.replan_count,
                limit = self.config.max_replans,
                "replan limit reached; command rejected"
            );
            self.record_decision(
                Decision::new(DecisionKind::Ail, "replan_rejected")
                    .with_metadata(json!({"limit": self.config.max_replans})),
            );
            return Ok(false);
        }
        let Some(oracle) = self.oracle.clone() else {
            tracing::warn!("replan requested but no capability oracle is attached");
            return Ok(false);
        };

        let context = available_context
            .unwrap_or_else(|| serde_json::to_value(&self.state.context).unwrap_or(Value::Null));
        let new_tasks = oracle
            .augment_dag(&self.graph, &self.state.tasks, new_requirement, &context)
            .await?;
        if new_tasks.is_empty() {
            tracing::info!(%new_requirement, "replan produced no changes");
            return Ok(false);
        }

        let added = new_tasks.len();
        self.graph = self.graph.extend(new_tasks, layer_index)?;
        self.state = reduce(&self.state, &StateUpdate::default().with_replan());
        tracing::info!(
            added,
            replan_count = self.state.replan_count,
            total_layers = self.graph.layers().len(),
            "replan accepted"
        );
        Ok(true)
    }

    fn record_decision(&mut self, decision: Decision) {
        self.state = reduce(
            &self.state,
            &StateUpdate::default().with_decision(decision),
        );
    }

    /// Fire-and-forget speculation over the next layer's pending tasks.
    fn trigger_speculation(&self, next_layer: usize) {
        let Some(speculator) = self.speculator.clone() else {
            return;
        };
        let Some(ids) = self.graph.layers().get(next_layer) else {
            return;
        };
        let tasks: Vec<Task> = ids
            .iter()
            .filter(|id| !self.state.has_result(id))
            .filter_map(|id| self.graph.task(id).cloned())
            .collect();
        if tasks.is_empty() {
            return;
        }
        let state = self.state.clone();
        tokio::spawn(async move {
            let cached = speculator.speculate_layer(tasks, state).await;
            if cached > 0 {
                tracing::debug!(cached, "layer speculation cached results");
            }
        });
    }

    fn publish_trace(&self, total_time_ms: u64) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let trace = Trace::from_workflow(&self.state, &self.graph, total_time_ms, self.intent.clone());
        publisher.publish(trace);
    }

    /// Post-workflow prediction: speculate the oracle's likely next calls.
    fn predict_next(&self) {
        let (Some(speculator), Some(oracle)) = (self.speculator.clone(), self.oracle.clone())
        else {
            return;
        };
        let executed_tools: Vec<String> = self
            .state
            .tasks
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|r| self.graph.task(&r.task_id).and_then(|t| t.tool()))
            .map(str::to_string)
            .collect();
        let state = self.state.clone();
        tokio::spawn(async move {
            let cached = speculator
                .predict_next(oracle.as_ref(), &state, executed_tools)
                .await;
            if cached > 0 {
                tracing::debug!(cached, "post-workflow prediction cached results");
            }
        });
    }

    fn prune_checkpoints(&self) {
        let Some(store) = self.checkpoints.clone() else {
            return;
        };
        let workflow_id = self.state.workflow_id.clone();
        let policy = self.config.retention.clone();
        tokio::spawn(async move {
            if let Err(e) = store.prune(&workflow_id, &policy).await {
                tracing::warn!(%workflow_id, error = %e, "checkpoint pruning failed");
            }
        });
    }
}

/// Execute a single task. Emits its own lifecycle events and returns the
/// result, any sandbox state to carry forward, and whether a failure here is
/// fatal to the workflow.
async fn execute_task(
    ctx: TaskContext,
    task: Task,
    deps: BTreeMap<TaskId, TaskResult>,
    permits: Arc<Semaphore>,
) -> (TaskResult, Option<Value>, bool) {
    // A closed semaphore is unreachable while the runner is alive.
    let Ok(_permit) = permits.acquire_owned().await else {
        return (
            TaskResult::error(
                &task.id,
                TaskError::new(ErrorKind::Runtime, "executor shutting down"),
                0,
            ),
            None,
            task.side_effects,
        );
    };

    ctx.events
        .emit(ExecutionEvent::TaskStart {
            timestamp: Utc::now(),
            workflow_id: ctx.workflow_id.clone(),
            task_id: task.id.clone(),
            tool: task.tool().map(str::to_string),
        })
        .await;

    match &task.kind {
        TaskKind::ToolCall { tool } => {
            let args = resolve_arguments_lenient(&task, &ctx.state, &ctx.safety);

            // Fresh speculation for the identical call serves straight from
            // cache; no transport round trip.
            if let Some(speculator) = &ctx.speculator {
                let key = fingerprint(tool, &args);
                if let Some(output) = speculator.cache().get(&key) {
                    tracing::debug!(task_id = %task.id, %tool, "served from speculation cache");
                    let result = TaskResult::success(&task.id, output, 0).from_cache();
                    ctx.events
                        .emit(ExecutionEvent::TaskComplete {
                            timestamp: Utc::now(),
                            workflow_id: ctx.workflow_id.clone(),
                            task_id: task.id.clone(),
                            execution_time_ms: 0,
                            from_cache: Some(true),
                        })
                        .await;
                    return (result, None, task.side_effects);
                }
            }

            let result = ctx
                .invoker
                .invoke(&task.id, tool, &args, task.side_effects)
                .await;
            emit_tool_result(&ctx, &result).await;
            (result, None, task.side_effects)
        }
        TaskKind::CodeExec { code } => {
            let Some(sandbox) = &ctx.sandbox else {
                // Missing runtime is a configuration error, fatal regardless
                // of the task's own flag.
                let result = TaskResult::error(
                    &task.id,
                    TaskError::new(ErrorKind::Validation, "no sandbox runtime configured"),
                    0,
                );
                emit_tool_result(&ctx, &result).await;
                return (result, None, true);
            };

            let args = resolve_arguments_lenient(&task, &ctx.state, &ctx.safety);
            let prior_state = ctx
                .state
                .context
                .get(&format!("{}::state", task.id))
                .cloned()
                .unwrap_or(Value::Null);

            let started = Instant::now();
            let max_attempts = if task.side_effects {
                1
            } else {
                MAX_RETRY_ATTEMPTS
            };
            let mut attempt: u32 = 0;
            let outcome = loop {
                attempt += 1;
                match sandbox
                    .execute(code, args.clone(), deps.clone(), prior_state.clone())
                    .await
                {
                    Ok(outcome) => break Ok(outcome),
                    Err(e) => {
                        let retryable = matches!(
                            e.kind(),
                            ErrorKind::Runtime | ErrorKind::Network | ErrorKind::Timeout
                        );
                        if retryable && attempt < max_attempts {
                            let delay = RETRY_BACKOFF_BASE * 2u32.pow(attempt - 1);
                            tracing::debug!(
                                task_id = %task.id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying safe-to-fail code task"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        break Err(e);
                    }
                }
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(code_outcome) => {
                    let result =
                        TaskResult::success(&task.id, code_outcome.result, duration_ms);
                    ctx.events
                        .emit(ExecutionEvent::TaskComplete {
                            timestamp: Utc::now(),
                            workflow_id: ctx.workflow_id.clone(),
                            task_id: task.id.clone(),
                            execution_time_ms: duration_ms,
                            from_cache: None,
                        })
                        .await;
                    let carried =
                        (code_outcome.state != Value::Null).then_some(code_outcome.state);
                    (result, carried, task.side_effects)
                }
                Err(e) => {
                    let error = e.into_task_error();
                    if task.side_effects {
                        let result = TaskResult::error(&task.id, error, duration_ms);
                        emit_tool_result(&ctx, &result).await;
                        (result, None, true)
                    } else {
                        ctx.events
                            .emit(ExecutionEvent::TaskWarning {
                                timestamp: Utc::now(),
                                workflow_id: ctx.workflow_id.clone(),
                                task_id: task.id.clone(),
                                message: format!(
                                    "safe-to-fail task failed after {attempt} attempt(s): {}",
                                    error.message
                                ),
                            })
                            .await;
                        let result = TaskResult::failed_safe(&task.id, error, duration_ms);
                        (result, None, false)
                    }
                }
            }
        }
    }
}

async fn emit_tool_result(ctx: &TaskContext, result: &TaskResult) {
    match result.status {
        TaskStatus::Success => {
            ctx.events
                .emit(ExecutionEvent::TaskComplete {
                    timestamp: Utc::now(),
                    workflow_id: ctx.workflow_id.clone(),
                    task_id: result.task_id.clone(),
                    execution_time_ms: result.duration_ms,
                    from_cache: result.from_cache.then_some(true),
                })
                .await;
        }
        _ => {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| TaskError::new(ErrorKind::Runtime, "task failed"));
            ctx.events
                .emit(ExecutionEvent::TaskError {
                    timestamp: Utc::now(),
                    workflow_id: ctx.workflow_id.clone(),
                    task_id: result.task_id.clone(),
                    error,
                })
                .await;
        }
    }
}
