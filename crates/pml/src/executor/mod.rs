// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The controlled executor: drives a workflow DAG layer by layer.
//!
//! [`ControlledExecutor`] is the orchestrator over every other subsystem:
//! it admits a validated [`TaskGraph`], runs each topological layer in
//! parallel, applies state updates through the reducers, checkpoints at each
//! boundary, services agent- and human-in-the-loop gates, accepts replans,
//! triggers speculation for the next layer, and publishes a trace on
//! completion.
//!
//! Construction is builder-style: a tool transport and a permissions source
//! are required; checkpointing, tracing, the capability oracle, the sandbox
//! runtime, and the speculation cache are optional attachments.
//!
//! ```rust,ignore
//! let executor = ControlledExecutor::new(transport, permissions)
//!     .with_checkpoint_store(Arc::new(MemoryCheckpointStore::new()))
//!     .with_speculation_cache(Arc::new(SpeculationCache::new()));
//!
//! let run = executor.start(graph, initial_context);
//! while let Some(event) = run.events.recv().await { /* dashboard */ }
//! let final_state = run.join().await?;
//! ```

mod runner;
mod summary;

use crate::checkpoint::CheckpointStore;
use crate::command::{CommandQueue, CommandSender};
use crate::constants::{
    DEFAULT_AIL_TIMEOUT, DEFAULT_HIL_TIMEOUT, DEFAULT_MAX_PARALLEL_TASKS, DEFAULT_MAX_REPLANS,
};
use crate::checkpoint::RetentionPolicy;
use crate::error::{Error, ErrorKind, Result};
use crate::events::{EventStream, EventSubscription};
use crate::feedback::{FeedbackPublisher, TraceStore};
use crate::graph::TaskGraph;
use crate::invoker::{ToolInvoker, ToolTransport};
use crate::oracle::CapabilityOracle;
use crate::safety::{PermissionsSource, SafetyOracle};
use crate::sandbox::{SandboxConfig, SandboxExecutor, SandboxRuntime};
use crate::sanitize::Sanitizer;
use crate::speculation::{SpeculationCache, SpeculationConfig, SpeculativeExecutor};
use crate::state::WorkflowState;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// When the agent-in-the-loop gate fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AilMode {
    #[default]
    Off,
    /// After every layer.
    PerLayer,
    /// Only after layers that had task errors.
    OnError,
}

/// When the human-in-the-loop gate fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HilMode {
    #[default]
    Off,
    /// After every layer.
    Always,
    /// Only after layers containing side-effecting tasks.
    CriticalOnly,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Tasks of one layer executed concurrently.
    pub max_parallel: usize,
    pub ail: AilMode,
    pub hil: HilMode,
    /// AIL gate wait; on expiry the workflow continues.
    pub ail_timeout: Duration,
    /// HIL gate wait; on expiry the workflow aborts.
    pub hil_timeout: Duration,
    pub max_replans: u32,
    /// Retention applied to the checkpoint store after completion.
    pub retention: RetentionPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL_TASKS,
            ail: AilMode::Off,
            hil: HilMode::Off,
            ail_timeout: DEFAULT_AIL_TIMEOUT,
            hil_timeout: DEFAULT_HIL_TIMEOUT,
            max_replans: DEFAULT_MAX_REPLANS,
            retention: RetentionPolicy::default(),
        }
    }
}

/// Handle to a running workflow.
pub struct WorkflowRun {
    pub workflow_id: String,
    /// Subscription created before the first event; no event is missed.
    pub events: EventSubscription,
    /// Command ingress for this workflow.
    pub commands: CommandSender,
    handle: JoinHandle<Result<WorkflowState>>,
}

impl WorkflowRun {
    /// Wait for the workflow to finish and return its final state.
    pub async fn join(self) -> Result<WorkflowState> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("workflow task failed: {e}"))),
        }
    }

    /// Split the run into its parts, for callers that consume events and the
    /// final state from different tasks.
    pub fn into_parts(
        self,
    ) -> (
        String,
        EventSubscription,
        CommandSender,
        JoinHandle<Result<WorkflowState>>,
    ) {
        (self.workflow_id, self.events, self.commands, self.handle)
    }
}

/// Orchestrates DAG execution. Cheap to clone; workflows share the
/// transport, permissions, cache, and stores.
#[derive(Clone)]
pub struct ControlledExecutor {
    invoker: Arc<ToolInvoker>,
    safety: SafetyOracle,
    sanitizer: Sanitizer,
    config: ExecutorConfig,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    publisher: Option<FeedbackPublisher>,
    oracle: Option<Arc<dyn CapabilityOracle>>,
    sandbox: Option<Arc<SandboxExecutor>>,
    speculator: Option<SpeculativeExecutor>,
    active: Arc<DashMap<String, CommandSender>>,
}

impl ControlledExecutor {
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        permissions: Arc<dyn PermissionsSource>,
    ) -> Self {
        let safety = SafetyOracle::new(permissions);
        let invoker = Arc::new(ToolInvoker::new(transport, safety.clone()));
        Self {
            invoker,
            safety,
            sanitizer: Sanitizer::new(),
            config: ExecutorConfig::default(),
            checkpoints: None,
            publisher: None,
            oracle: None,
            sandbox: None,
            speculator: None,
            active: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    #[must_use]
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    #[must_use]
    pub fn with_trace_store(mut self, store: Arc<dyn TraceStore>) -> Self {
        self.publisher = Some(FeedbackPublisher::new(store));
        self
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn CapabilityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Attach a sandbox runtime for `code_exec` tasks.
    pub fn with_sandbox(
        mut self,
        config: SandboxConfig,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Result<Self> {
        let executor = SandboxExecutor::new(config, runtime, Arc::clone(&self.invoker))?;
        self.sandbox = Some(Arc::new(executor));
        Ok(self)
    }

    /// Attach a speculation cache, enabling intra-workflow speculation and
    /// post-workflow prediction.
    #[must_use]
    pub fn with_speculation_cache(mut self, cache: Arc<SpeculationCache>) -> Self {
        self.speculator = Some(SpeculativeExecutor::new(
            Arc::clone(&self.invoker),
            cache,
            self.safety.clone(),
            SpeculationConfig::default(),
        ));
        self
    }

    pub fn invoker(&self) -> &Arc<ToolInvoker> {
        &self.invoker
    }

    pub fn safety(&self) -> &SafetyOracle {
        &self.safety
    }

    /// Launch a workflow. Events and commands are live immediately; await
    /// [`WorkflowRun::join`] for the final state.
    pub fn start(&self, graph: TaskGraph, initial_context: BTreeMap<String, Value>) -> WorkflowRun {
        self.start_with_intent(graph, initial_context, None)
    }

    /// Launch a workflow with the intent text recorded on its trace. The
    /// intent is caller-provided only; the engine never synthesizes one.
    pub fn start_with_intent(
        &self,
        graph: TaskGraph,
        initial_context: BTreeMap<String, Value>,
        intent: Option<String>,
    ) -> WorkflowRun {
        let workflow_id = format!("wf-{}", uuid::Uuid::new_v4().simple());
        let state = WorkflowState::new(&workflow_id, initial_context, &self.sanitizer);
        self.launch(graph, state, 0, intent)
    }

    /// Resume a workflow from a checkpoint. Layers are recomputed from
    /// `graph`; completed task results are replayed, never re-executed, and
    /// execution continues at the checkpointed layer plus one.
    pub async fn resume(&self, graph: TaskGraph, checkpoint_id: &str) -> Result<WorkflowRun> {
        let store = self
            .checkpoints
            .as_ref()
            .ok_or_else(|| Error::Validation("resume requires a checkpoint store".into()))?;
        let checkpoint = store
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("checkpoint '{checkpoint_id}'")))?;

        tracing::info!(
            workflow_id = %checkpoint.workflow_id,
            layer = checkpoint.layer,
            "resuming workflow from checkpoint"
        );
        Ok(self.launch(graph, checkpoint.state, checkpoint.layer + 1, None))
    }

    /// Drive a workflow to completion, discarding events.
    pub async fn execute(
        &self,
        graph: TaskGraph,
        initial_context: BTreeMap<String, Value>,
    ) -> Result<WorkflowState> {
        let WorkflowRun { events, handle, .. } = self.start(graph, initial_context);
        // Keep the subscription drained so emitters never stall on it.
        let drain = tokio::spawn(events.collect());
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("workflow task failed: {e}"))),
        };
        drain.abort();
        result
    }

    /// Proactively cancel a running workflow. Returns false when the
    /// workflow is not active.
    pub fn abort(&self, workflow_id: &str, reason: impl Into<String>) -> bool {
        match self.active.get(workflow_id) {
            Some(sender) => sender.abort(reason.into()),
            None => false,
        }
    }

    fn launch(
        &self,
        graph: TaskGraph,
        state: WorkflowState,
        start_layer: usize,
        intent: Option<String>,
    ) -> WorkflowRun {
        let workflow_id = state.workflow_id.clone();
        let events = Arc::new(EventStream::new());
        let subscription = events.subscribe();
        let (command_tx, command_rx) = CommandQueue::channel();

        self.active.insert(workflow_id.clone(), command_tx.clone());

        let runner = runner::WorkflowRunner {
            graph,
            state,
            start_layer,
            intent,
            events,
            commands: command_rx,
            invoker: Arc::clone(&self.invoker),
            safety: self.safety.clone(),
            sanitizer: self.sanitizer.clone(),
            config: self.config.clone(),
            checkpoints: self.checkpoints.clone(),
            publisher: self.publisher.clone(),
            oracle: self.oracle.clone(),
            sandbox: self.sandbox.clone(),
            speculator: self.speculator.clone(),
        };

        let active = Arc::clone(&self.active);
        let id_for_cleanup = workflow_id.clone();
        let handle = tokio::spawn(async move {
            let result = runner.run().await;
            active.remove(&id_for_cleanup);
            result
        });

        WorkflowRun {
            workflow_id,
            events: subscription,
            commands: command_tx,
            handle,
        }
    }
}

/// Returns the conventional process exit code for a finished workflow:
/// 0 on success, 2 on validation failure, 1 on any other fatal error.
pub fn workflow_exit_code(result: &Result<WorkflowState>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) if e.kind() == ErrorKind::Validation => 2,
        Err(_) => 1,
    }
}
