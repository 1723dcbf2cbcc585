// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PML - Procedural Memory Layer execution core
//!
//! A DAG execution and speculation engine for agent workflows:
//!
//! - **Parallel DAG executor**: heterogeneous tasks (MCP tool calls and
//!   sandboxed code) run in topological layers with event streaming and
//!   checkpoint/resume.
//! - **Adaptive control plane**: agent- and human-in-the-loop decision
//!   points interleave with the running workflow (replan, approve, abort).
//! - **Speculative execution**: upcoming safe tasks are pre-executed under a
//!   safety policy and served from a fingerprinted cache when they actually
//!   run.
//! - **Exploratory execution**: hypothetical paths run hybrid real/mock to
//!   produce traces for learning.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use pml::{ControlledExecutor, Task, TaskGraph};
//! use pml::task::ArgSpec;
//!
//! let graph = TaskGraph::new(vec![
//!     Task::tool_call("read", "fs:read_file")
//!         .with_arg("path", ArgSpec::parameter("input_path")),
//!     Task::tool_call("summarize", "llm:summarize")
//!         .with_arg("text", ArgSpec::reference("read", "content"))
//!         .depends_on(["read"]),
//! ])?;
//!
//! let executor = ControlledExecutor::new(transport, permissions);
//! let final_state = executor.execute(graph, initial_context).await?;
//! ```
//!
//! External collaborators (tool transport, capability oracle, checkpoint and
//! trace stores, permissions source) are traits; the engine ships in-memory
//! and file-backed defaults where a default makes sense.

pub mod canonical;
pub mod checkpoint;
pub mod command;
pub mod constants;
pub mod error;
pub mod events;
pub mod executor;
pub mod exploration;
pub mod feedback;
pub mod graph;
pub mod invoker;
pub mod oracle;
pub mod resolver;
pub mod safety;
pub mod sandbox;
pub mod sanitize;
pub mod speculation;
pub mod state;
pub mod task;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
    RetentionPolicy,
};
pub use command::{Command, CommandSender};
pub use error::{Error, ErrorKind, Result, TaskError};
pub use events::{DecisionKind, EventSubscription, ExecutionEvent};
pub use executor::{
    workflow_exit_code, AilMode, ControlledExecutor, ExecutorConfig, HilMode, WorkflowRun,
};
pub use exploration::{ExplorationConfig, ExploratoryExecutor, PathTrace};
pub use feedback::{FeedbackPublisher, Trace, TraceStore};
pub use graph::TaskGraph;
pub use invoker::{ToolInvoker, ToolTransport};
pub use oracle::{CandidatePath, CandidateStep, CapabilityOracle, PredictedCall, WorkflowSummary};
pub use resolver::{resolve_arguments, resolve_arguments_lenient, Unresolvable};
pub use safety::{
    ApprovalMode, PermissionScope, PermissionsSource, SafetyOracle, StaticPermissions,
    ToolPermissions,
};
pub use sandbox::{CodeOutcome, SandboxBroker, SandboxConfig, SandboxExecutor, SandboxRuntime};
pub use sanitize::Sanitizer;
pub use speculation::{
    fingerprint, CacheStats, SpeculationCache, SpeculationConfig, SpeculativeExecutor,
};
pub use state::{reduce, Decision, StateUpdate, WorkflowState};
pub use task::{ArgSpec, CheckpointGate, Task, TaskId, TaskKind, TaskResult, TaskStatus};
