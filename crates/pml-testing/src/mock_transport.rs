// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Mock tool transport for testing workflows without a wire.

use async_trait::async_trait;
use parking_lot::Mutex;
use pml::error::{Error, Result};
use pml::invoker::ToolTransport;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Handler function type for dynamic per-tool responses.
pub type ToolHandler = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A configurable mock transport.
///
/// Response precedence per call: a scripted outcome (consumed in order),
/// then a registered handler, then a fixed response, then an echo of the
/// tool and arguments.
///
/// # Example
///
/// ```rust
/// use pml_testing::MockTransport;
/// use serde_json::json;
///
/// let transport = MockTransport::new()
///     .with_response("fs:read_file", json!({"content": "hello"}))
///     .with_handler("calc:add", |args| {
///         let a = args["a"].as_i64().unwrap_or(0);
///         let b = args["b"].as_i64().unwrap_or(0);
///         Ok(json!({"sum": a + b}))
///     });
/// ```
pub struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    handlers: Mutex<HashMap<String, ToolHandler>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    call_log: Mutex<Vec<(String, Value)>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            call_log: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    /// Fixed response for a tool.
    #[must_use]
    pub fn with_response(self, tool: impl Into<String>, response: Value) -> Self {
        self.responses.lock().insert(tool.into(), response);
        self
    }

    /// Dynamic handler for a tool.
    #[must_use]
    pub fn with_handler<F>(self, tool: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.lock().insert(tool.into(), Arc::new(handler));
        self
    }

    /// Scripted outcomes consumed one per call, ahead of handlers and fixed
    /// responses. Use for failure-then-success retry sequences.
    #[must_use]
    pub fn with_script(self, tool: impl Into<String>, outcomes: Vec<Result<Value>>) -> Self {
        self.scripts
            .lock()
            .insert(tool.into(), outcomes.into_iter().collect());
        self
    }

    /// Delay injected before every call, for deadline tests.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Queue one failure for a tool's next call.
    pub fn fail_next(&self, tool: impl Into<String>, error: Error) {
        self.scripts
            .lock()
            .entry(tool.into())
            .or_default()
            .push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().len()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.call_log.lock().clone()
    }

    /// Arguments of every call made to one tool.
    pub fn calls_for(&self, tool: &str) -> Vec<Value> {
        self.call_log
            .lock()
            .iter()
            .filter(|(t, _)| t == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn was_called(&self, tool: &str) -> bool {
        self.call_log.lock().iter().any(|(t, _)| t == tool)
    }

    pub fn reset(&self) {
        self.call_log.lock().clear();
        self.scripts.lock().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTransport for MockTransport {
    async fn call(&self, tool: &str, args: &Value, _deadline: Duration) -> Result<Value> {
        self.call_log.lock().push((tool.to_string(), args.clone()));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(tool)
            .and_then(VecDeque::pop_front);
        if let Some(outcome) = scripted {
            return outcome;
        }

        let handler = self.handlers.lock().get(tool).cloned();
        if let Some(handler) = handler {
            return handler(args);
        }

        if let Some(response) = self.responses.lock().get(tool) {
            return Ok(response.clone());
        }

        Ok(json!({"tool": tool, "args": args}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_take_precedence_then_fall_back() {
        let transport = MockTransport::new()
            .with_response("t", json!("fixed"))
            .with_script("t", vec![Err(Error::Transport("first".into()))]);

        let err = transport
            .call("t", &json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("first"));

        let ok = transport
            .call("t", &json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(ok, json!("fixed"));
    }

    #[tokio::test]
    async fn unknown_tools_echo() {
        let transport = MockTransport::new();
        let out = transport
            .call("x:y", &json!({"k": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out["tool"], "x:y");
        assert_eq!(out["args"]["k"], 1);
    }

    #[tokio::test]
    async fn call_history_is_recorded_per_tool() {
        let transport = MockTransport::new();
        transport
            .call("a", &json!({"n": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        transport
            .call("b", &json!({}), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 2);
        assert!(transport.was_called("a"));
        assert_eq!(transport.calls_for("a"), vec![json!({"n": 1})]);
    }
}
