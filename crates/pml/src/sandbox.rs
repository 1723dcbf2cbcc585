// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Sandboxed code execution with a deny-by-default capability model.
//!
//! A `code_exec` task's source runs inside a pluggable [`SandboxRuntime`]
//! (subprocess, isolate, wasm runtime). The engine never trusts the runtime:
//! every effect the code is allowed to have goes through the
//! [`SandboxBroker`], which enforces the policy:
//!
//! - file reads and writes are confined to the workspace root; `..`
//!   traversal and absolute paths outside the root fail with a permission
//!   error;
//! - network, environment, and subprocess capabilities are categorically
//!   denied;
//! - the only escape hatch is the injected `mcp` proxy, a deterministic RPC
//!   back to the tool invoker.
//!
//! The engine enforces the source size cap before dispatch and the timeout
//! around the runtime call. The memory cap is carried in the context for the
//! runtime to enforce.

use crate::constants::{
    DEFAULT_SANDBOX_MEMORY_CAP_BYTES, DEFAULT_SANDBOX_TIMEOUT, MAX_SANDBOX_SOURCE_BYTES,
};
use crate::error::{Error, Result};
use crate::invoker::ToolInvoker;
use crate::task::{TaskId, TaskResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sandbox policy configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Root directory the code may read and write under.
    pub workspace_root: PathBuf,
    /// Wall-clock budget for one execution.
    pub timeout: Duration,
    /// Memory cap in bytes, enforced by the runtime.
    pub memory_cap_bytes: u64,
    /// Maximum accepted source size in bytes.
    pub max_source_bytes: usize,
}

impl SandboxConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            timeout: DEFAULT_SANDBOX_TIMEOUT,
            memory_cap_bytes: DEFAULT_SANDBOX_MEMORY_CAP_BYTES,
            max_source_bytes: MAX_SANDBOX_SOURCE_BYTES,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_memory_cap(mut self, bytes: u64) -> Self {
        self.memory_cap_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    /// Reject configurations that cannot be enforced.
    pub fn validate(&self) -> Result<()> {
        if !self.workspace_root.is_absolute() {
            return Err(Error::Validation(format!(
                "sandbox workspace root must be absolute, got '{}'",
                self.workspace_root.display()
            )));
        }
        if self.max_source_bytes == 0 || self.memory_cap_bytes == 0 {
            return Err(Error::Validation(
                "sandbox caps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bindings visible to sandboxed code.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    /// The task's resolved arguments (`args` binding).
    pub args: Value,
    /// Full results of dependency tasks (`deps` binding), so code can branch
    /// on `deps[x].status`, including `failed_safe`.
    pub deps: BTreeMap<TaskId, TaskResult>,
    /// State carried over from a previous execution of this task, for
    /// multi-step code tasks resumed from a checkpoint.
    pub prior_state: Value,
    /// Memory cap the runtime must enforce.
    pub memory_cap_bytes: u64,
}

/// Result shape of a sandboxed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOutcome {
    /// Value stored as the task output.
    pub result: Value,
    /// Opaque state retained for checkpoint continuity.
    #[serde(default)]
    pub state: Value,
    pub execution_time_ms: u64,
}

impl CodeOutcome {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            state: Value::Null,
            execution_time_ms: 0,
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }
}

/// The pluggable language runtime. Implementations execute `code` with the
/// given bindings and route every effect through the broker.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn run(
        &self,
        code: &str,
        ctx: SandboxContext,
        broker: SandboxBroker,
    ) -> Result<CodeOutcome>;
}

/// Capability gate handed to the runtime. Cloneable and cheap.
#[derive(Clone)]
pub struct SandboxBroker {
    workspace_root: PathBuf,
    invoker: Arc<ToolInvoker>,
}

impl SandboxBroker {
    pub fn new(workspace_root: impl Into<PathBuf>, invoker: Arc<ToolInvoker>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            invoker,
        }
    }

    /// Lexically resolve a requested path against the workspace root.
    ///
    /// Absolute paths must already sit under the root; relative paths are
    /// joined to it. Any `..` that would climb above the root is a
    /// permission error, before any filesystem access happens.
    pub fn resolve_path(&self, requested: &str) -> Result<PathBuf> {
        let path = Path::new(requested);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.workspace_root).map_err(|_| {
                Error::Permission(format!("path '{requested}' is outside the workspace"))
            })?
        } else {
            path
        };

        let mut resolved = self.workspace_root.clone();
        let mut depth: usize = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(Error::Permission(format!(
                            "path '{requested}' escapes the workspace"
                        )));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::Permission(format!(
                        "path '{requested}' is outside the workspace"
                    )));
                }
            }
        }
        Ok(resolved)
    }

    /// Read a file inside the workspace.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve_path(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    Error::NotFound(format!("file '{path}' not found"))
                }
                _ => Error::Sandbox(format!("read '{path}': {e}")),
            })
    }

    /// Write a file inside the workspace, creating parent directories.
    pub async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Sandbox(format!("create '{path}' parents: {e}")))?;
        }
        tokio::fs::write(&resolved, contents)
            .await
            .map_err(|e| Error::Sandbox(format!("write '{path}': {e}")))
    }

    /// The injected `mcp` proxy: one deterministic RPC through the invoker.
    pub async fn mcp_call(&self, tool: &str, args: &Value) -> Result<Value> {
        self.invoker.call_raw(tool, args).await
    }

    /// Environment access is denied.
    pub fn environment_variable(&self, name: &str) -> Result<String> {
        Err(Error::Permission(format!(
            "environment access denied (requested '{name}')"
        )))
    }

    /// Subprocess spawning is denied.
    pub fn spawn_process(&self, command: &str) -> Result<Value> {
        Err(Error::Permission(format!(
            "subprocess execution denied (requested '{command}')"
        )))
    }

    /// Raw network I/O is denied; tools are the only way out.
    pub fn network_request(&self, url: &str) -> Result<Value> {
        Err(Error::Permission(format!(
            "network access denied (requested '{url}')"
        )))
    }

    /// The host runtime object is never exposed to sandboxed code.
    pub fn host_runtime(&self) -> Result<Value> {
        Err(Error::Permission(
            "host runtime object is not exposed".to_string(),
        ))
    }
}

/// Drives one `code_exec` task through the configured runtime.
pub struct SandboxExecutor {
    config: SandboxConfig,
    runtime: Arc<dyn SandboxRuntime>,
    invoker: Arc<ToolInvoker>,
}

impl SandboxExecutor {
    pub fn new(
        config: SandboxConfig,
        runtime: Arc<dyn SandboxRuntime>,
        invoker: Arc<ToolInvoker>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            runtime,
            invoker,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute source text with the given bindings.
    pub async fn execute(
        &self,
        code: &str,
        args: Value,
        deps: BTreeMap<TaskId, TaskResult>,
        prior_state: Value,
    ) -> Result<CodeOutcome> {
        if code.len() > self.config.max_source_bytes {
            return Err(Error::Validation(format!(
                "source size {} exceeds cap of {} bytes",
                code.len(),
                self.config.max_source_bytes
            )));
        }

        let ctx = SandboxContext {
            args,
            deps,
            prior_state,
            memory_cap_bytes: self.config.memory_cap_bytes,
        };
        let broker = SandboxBroker::new(&self.config.workspace_root, Arc::clone(&self.invoker));

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.runtime.run(code, ctx, broker),
        )
        .await
        .map_err(|_| Error::Timeout(self.config.timeout))??;

        Ok(CodeOutcome {
            execution_time_ms: started.elapsed().as_millis() as u64,
            ..outcome
        })
    }
}
