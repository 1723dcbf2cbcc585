// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! A line-oriented sandbox runtime for tests.
//!
//! Interprets task source text as one command per line, routing every effect
//! through the [`SandboxBroker`] exactly like a real language runtime would.
//! That makes it a faithful harness for isolation tests: a `read
//! ../../etc/passwd` line hits the broker's path guard and fails with a
//! permission error, a `fetch` line hits the categorical network denial.
//!
//! Commands:
//!
//! | line | effect |
//! |------|--------|
//! | `emit <json>` | set the task result value |
//! | `state <json>` | set the carried state value |
//! | `read <path>` | broker file read; result becomes `{"content": ...}` |
//! | `write <path> <text>` | broker file write |
//! | `mcp <tool> <json>` | proxy tool call; result becomes the output |
//! | `env <name>` | denied environment access |
//! | `spawn <command>` | denied subprocess |
//! | `fetch <url>` | denied raw network |
//! | `host` | denied host-runtime object |
//! | `args` | result becomes the `args` binding |
//! | `deps` | result becomes a map of dependency statuses |
//! | `flaky <n>` | fail the first `n` executions of this source text |
//! | `sleep <ms>` | sleep, for timeout tests |
//! | `fail <message>` | unconditional runtime failure |
//!
//! Lines starting with `#` and blank lines are ignored. The first failing
//! command aborts the execution with its error.

use async_trait::async_trait;
use parking_lot::Mutex;
use pml::error::{Error, Result};
use pml::sandbox::{CodeOutcome, SandboxBroker, SandboxContext, SandboxRuntime};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Scripted sandbox runtime. Shared across executions; `flaky` counters are
/// keyed by source text.
#[derive(Default)]
pub struct ScriptedRuntime {
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_attempts(&self, code: &str) -> u32 {
        let mut attempts = self.attempts.lock();
        let counter = attempts.entry(code.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

fn parse_json(raw: &str, line: &str) -> Result<Value> {
    serde_json::from_str(raw.trim())
        .map_err(|e| Error::Sandbox(format!("bad JSON in line '{line}': {e}")))
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn run(
        &self,
        code: &str,
        ctx: SandboxContext,
        broker: SandboxBroker,
    ) -> Result<CodeOutcome> {
        let attempt = self.bump_attempts(code);
        let mut result = Value::Null;
        let mut state = Value::Null;

        for line in code.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "emit" => result = parse_json(rest, line)?,
                "state" => state = parse_json(rest, line)?,
                "read" => {
                    let content = broker.read_file(rest.trim()).await?;
                    result = json!({ "content": content });
                }
                "write" => {
                    let (path, text) = rest
                        .split_once(' ')
                        .ok_or_else(|| Error::Sandbox(format!("write needs a path and text: '{line}'")))?;
                    broker.write_file(path, text).await?;
                    result = json!({ "written": path });
                }
                "mcp" => {
                    let (tool, raw_args) = rest
                        .split_once(' ')
                        .ok_or_else(|| Error::Sandbox(format!("mcp needs a tool and args: '{line}'")))?;
                    let args = parse_json(raw_args, line)?;
                    result = broker.mcp_call(tool, &args).await?;
                }
                "env" => {
                    broker.environment_variable(rest.trim())?;
                }
                "spawn" => {
                    broker.spawn_process(rest.trim())?;
                }
                "fetch" => {
                    broker.network_request(rest.trim())?;
                }
                "host" => {
                    broker.host_runtime()?;
                }
                "args" => result = ctx.args.clone(),
                "deps" => {
                    let statuses: serde_json::Map<String, Value> = ctx
                        .deps
                        .iter()
                        .map(|(id, dep)| {
                            (
                                id.clone(),
                                serde_json::to_value(dep.status).unwrap_or(Value::Null),
                            )
                        })
                        .collect();
                    result = Value::Object(statuses);
                }
                "flaky" => {
                    let threshold: u32 = rest.trim().parse().map_err(|_| {
                        Error::Sandbox(format!("flaky needs a count: '{line}'"))
                    })?;
                    if attempt <= threshold {
                        return Err(Error::Sandbox(format!(
                            "flaky failure on attempt {attempt}"
                        )));
                    }
                }
                "sleep" => {
                    let ms: u64 = rest.trim().parse().map_err(|_| {
                        Error::Sandbox(format!("sleep needs milliseconds: '{line}'"))
                    })?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                "fail" => return Err(Error::Sandbox(rest.trim().to_string())),
                other => {
                    return Err(Error::Sandbox(format!("unknown command '{other}'")));
                }
            }
        }

        Ok(CodeOutcome::new(result).with_state(state))
    }
}
