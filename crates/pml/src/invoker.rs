// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Uniform tool invocation with deadlines, classification, and retry.
//!
//! [`ToolTransport`] is the wire seam: the engine never speaks a protocol
//! itself. [`ToolInvoker`] wraps a transport with the execution policy:
//! - a per-call deadline (default 30 s), expiry classified as `timeout`;
//! - transport failures classified as `network`;
//! - automatic retry for `network`/`timeout` only, up to 3 attempts with
//!   exponential backoff (100, 200, 400 ms), and only on tools the safety
//!   oracle marks read-only;
//! - tasks flagged `side_effects` are never retried automatically, whatever
//!   the tool's permissions say.

use crate::constants::{DEFAULT_TOOL_DEADLINE, MAX_RETRY_ATTEMPTS, RETRY_BACKOFF_BASE};
use crate::error::{Error, Result};
use crate::safety::SafetyOracle;
use crate::task::TaskResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transport contract for calling an MCP tool. Wire protocol out of scope;
/// implementations classify their failures through [`Error`] variants.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Call `tool` with `args`, finishing within `deadline`.
    async fn call(&self, tool: &str, args: &Value, deadline: Duration) -> Result<Value>;
}

/// Policy wrapper around a [`ToolTransport`].
#[derive(Clone)]
pub struct ToolInvoker {
    transport: Arc<dyn ToolTransport>,
    safety: SafetyOracle,
    deadline: Duration,
}

impl ToolInvoker {
    pub fn new(transport: Arc<dyn ToolTransport>, safety: SafetyOracle) -> Self {
        Self {
            transport,
            safety,
            deadline: DEFAULT_TOOL_DEADLINE,
        }
    }

    /// Override the per-call deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn safety(&self) -> &SafetyOracle {
        &self.safety
    }

    /// Invoke a tool under the full policy, producing a [`TaskResult`].
    ///
    /// `side_effects` is the task-level flag; when set, a failure is returned
    /// after the first attempt regardless of classification.
    pub async fn invoke(&self, task_id: &str, tool: &str, args: &Value, side_effects: bool) -> TaskResult {
        let started = Instant::now();
        let retry_allowed = !side_effects && self.safety.is_read_only(tool);

        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            match self.call_once(tool, args).await {
                Ok(output) => break Ok(output),
                Err(err) => {
                    let kind = err.kind();
                    if retry_allowed && kind.is_retryable() && attempt < MAX_RETRY_ATTEMPTS {
                        let delay = RETRY_BACKOFF_BASE * 2u32.pow(attempt - 1);
                        tracing::debug!(
                            %tool,
                            attempt,
                            kind = %kind,
                            delay_ms = delay.as_millis() as u64,
                            "retrying tool call"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break Err(err);
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => TaskResult::success(task_id, output, duration_ms),
            Err(err) => {
                tracing::warn!(%tool, task_id, error = %err, "tool call failed");
                TaskResult::error(task_id, err.into_task_error(), duration_ms)
            }
        }
    }

    /// One raw call with classification only, no retry. Used by speculation
    /// and exploration, where the caller owns the result disposition.
    pub async fn call_raw(&self, tool: &str, args: &Value) -> Result<Value> {
        self.call_once(tool, args).await
    }

    async fn call_once(&self, tool: &str, args: &Value) -> Result<Value> {
        match tokio::time::timeout(self.deadline, self.transport.call(tool, args, self.deadline))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.deadline)),
        }
    }
}
