// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Exploratory hybrid execution of hypothetical paths.
//!
//! When an intent has no matching capability, the oracle proposes candidate
//! paths and this executor walks them: steps whose tools the safety oracle
//! clears run for real (through the invoker, reusing the speculation cache);
//! everything else gets a deterministic mock. Each walk produces a
//! [`PathTrace`] for the learning store, scored with a confidence value.
//!
//! Mock precedence, in order: an explicit per-step mock wins entirely, then
//! a default derived from the tool's declared output schema, then the
//! minimal stub `{"_mocked": true, "tool": ..., "reason": "unsafe"}`.
//!
//! Global safety: concurrent explorations are throttled, each path has a
//! wall-clock budget, and walks stop at a maximum depth.

use crate::constants::{
    DEFAULT_EXPLORATION_PATH_TIMEOUT, DEFAULT_MAX_CONCURRENT_EXPLORATIONS,
    DEFAULT_MAX_EXPLORATION_DEPTH,
};
use crate::error::Result;
use crate::invoker::ToolInvoker;
use crate::oracle::{CandidatePath, CandidateStep, CapabilityOracle};
use crate::resolver::project;
use crate::safety::SafetyOracle;
use crate::speculation::{fingerprint, SpeculationCache};
use crate::task::{ArgSpec, TaskResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Exploration tuning knobs.
#[derive(Debug, Clone)]
pub struct ExplorationConfig {
    /// Candidate paths walked per intent.
    pub max_paths: usize,
    /// Maximum steps walked down one path.
    pub max_depth: usize,
    /// Wall-clock budget per path.
    pub path_timeout: Duration,
    /// Concurrent path walks.
    pub max_concurrent: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            max_paths: 3,
            max_depth: DEFAULT_MAX_EXPLORATION_DEPTH,
            path_timeout: DEFAULT_EXPLORATION_PATH_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_EXPLORATIONS,
        }
    }
}

/// Outcome of walking one candidate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTrace {
    pub path_id: String,
    /// Per-step results; `mocked` marks substituted steps.
    pub steps: Vec<TaskResult>,
    /// False when a real step failed or the walk timed out.
    pub viable: bool,
    /// Step id at which a real failure occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_step: Option<String>,
    /// Monotone score over (real-step ratio, dependency coherence,
    /// historical success), in [0, 1].
    pub confidence: f64,
    /// Fraction of steps that were mocked.
    pub mock_ratio: f64,
    pub total_duration_ms: u64,
}

/// Walks hypothetical paths with real calls for safe tools and mocks for the
/// rest.
#[derive(Clone)]
pub struct ExploratoryExecutor {
    invoker: Arc<ToolInvoker>,
    cache: Arc<SpeculationCache>,
    safety: SafetyOracle,
    config: ExplorationConfig,
    permits: Arc<Semaphore>,
}

impl ExploratoryExecutor {
    pub fn new(
        invoker: Arc<ToolInvoker>,
        cache: Arc<SpeculationCache>,
        safety: SafetyOracle,
        config: ExplorationConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            invoker,
            cache,
            safety,
            config,
            permits,
        }
    }

    /// Ask the oracle for candidate paths and walk each, bounded by the
    /// configured concurrency and per-path timeout.
    pub async fn explore(
        &self,
        oracle: &dyn CapabilityOracle,
        intent: &str,
        context: &Value,
    ) -> Result<Vec<PathTrace>> {
        let mut candidates = oracle.find_candidates(intent, context).await?;
        candidates.truncate(self.config.max_paths);
        tracing::info!(%intent, paths = candidates.len(), "exploring candidate paths");

        let walks = candidates.into_iter().map(|path| self.walk_bounded(path));
        Ok(futures::future::join_all(walks).await)
    }

    /// Explore and publish one exploratory trace per walked path. The
    /// caller's intent is recorded verbatim on each trace.
    pub async fn explore_and_publish(
        &self,
        oracle: &dyn CapabilityOracle,
        intent: &str,
        context: &Value,
        publisher: &crate::feedback::FeedbackPublisher,
    ) -> Result<Vec<PathTrace>> {
        let traces = self.explore(oracle, intent, context).await?;
        for path in &traces {
            publisher.publish(crate::feedback::Trace::from_path(
                path,
                Some(intent.to_string()),
            ));
        }
        Ok(traces)
    }

    async fn walk_bounded(&self, path: CandidatePath) -> PathTrace {
        let path_id = path.id.clone();
        // Closed semaphore is unreachable; produce an empty non-viable trace.
        let Ok(_permit) = self.permits.acquire().await else {
            return PathTrace {
                path_id,
                steps: Vec::new(),
                viable: false,
                failure_step: None,
                confidence: 0.0,
                mock_ratio: 0.0,
                total_duration_ms: 0,
            };
        };

        let started = Instant::now();
        match tokio::time::timeout(self.config.path_timeout, self.walk(&path)).await {
            Ok(mut trace) => {
                trace.total_duration_ms = started.elapsed().as_millis() as u64;
                trace
            }
            Err(_) => {
                tracing::debug!(path_id = %path.id, "exploration path timed out");
                PathTrace {
                    path_id,
                    steps: Vec::new(),
                    viable: false,
                    failure_step: None,
                    confidence: 0.0,
                    mock_ratio: 0.0,
                    total_duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    async fn walk(&self, path: &CandidatePath) -> PathTrace {
        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();
        let mut steps: Vec<TaskResult> = Vec::new();
        let mut viable = true;
        let mut failure_step = None;
        let mut real_steps = 0usize;
        let mut total_refs = 0usize;
        let mut resolved_refs = 0usize;

        for step in path.steps.iter().take(self.config.max_depth) {
            let (args, step_refs, step_resolved) = resolve_step_args(step, &outputs);
            total_refs += step_refs;
            resolved_refs += step_resolved;

            let fully_resolved = step_refs == step_resolved;
            if fully_resolved && self.safety.can_speculate(&step.tool, false) {
                match self.run_real(step, &args).await {
                    Ok(result) => {
                        real_steps += 1;
                        if let Some(output) = &result.output {
                            outputs.insert(step.id.clone(), output.clone());
                        }
                        steps.push(result);
                    }
                    Err(result) => {
                        // Real failure terminates the path.
                        steps.push(result);
                        viable = false;
                        failure_step = Some(step.id.clone());
                        break;
                    }
                }
            } else {
                let mock = mock_output(step);
                outputs.insert(step.id.clone(), mock.clone());
                steps.push(TaskResult::success(step.id.clone(), mock, 0).mocked());
            }
        }

        let total = steps.len();
        let mocked = steps.iter().filter(|s| s.mocked).count();
        let real_ratio = if total == 0 {
            0.0
        } else {
            real_steps as f64 / total as f64
        };
        let coherence = if total_refs == 0 {
            1.0
        } else {
            resolved_refs as f64 / total_refs as f64
        };
        let confidence = if viable {
            confidence_score(real_ratio, coherence, path.historical_success)
        } else {
            0.0
        };

        PathTrace {
            path_id: path.id.clone(),
            steps,
            viable,
            failure_step,
            confidence,
            mock_ratio: if total == 0 {
                0.0
            } else {
                mocked as f64 / total as f64
            },
            total_duration_ms: 0,
        }
    }

    /// Run a step for real, reusing and populating the speculation cache.
    async fn run_real(
        &self,
        step: &CandidateStep,
        args: &Value,
    ) -> std::result::Result<TaskResult, TaskResult> {
        let key = fingerprint(&step.tool, args);
        if let Some(output) = self.cache.get(&key) {
            return Ok(TaskResult::success(step.id.clone(), output, 0).from_cache());
        }

        let started = Instant::now();
        match self.invoker.call_raw(&step.tool, args).await {
            Ok(output) => {
                self.cache.put(key, output.clone());
                Ok(TaskResult::success(
                    step.id.clone(),
                    output,
                    started.elapsed().as_millis() as u64,
                ))
            }
            Err(e) => Err(TaskResult::error(
                step.id.clone(),
                e.into_task_error(),
                started.elapsed().as_millis() as u64,
            )),
        }
    }
}

/// Resolve a step's arguments against prior step outputs. Returns the args,
/// the number of reference specs, and how many of them resolved.
fn resolve_step_args(
    step: &CandidateStep,
    outputs: &BTreeMap<String, Value>,
) -> (Value, usize, usize) {
    let mut args = Map::with_capacity(step.arguments.len());
    let mut refs = 0;
    let mut resolved = 0;
    for (name, spec) in &step.arguments {
        let value = match spec {
            ArgSpec::Literal { value } => value.clone(),
            ArgSpec::Parameter { name } => {
                // Paths carry no workflow parameters; treat as unresolved.
                tracing::debug!(parameter = %name, "parameter in exploratory path left null");
                Value::Null
            }
            ArgSpec::Reference { task_id, json_path } => {
                refs += 1;
                match outputs.get(task_id).and_then(|out| project(out, json_path)) {
                    Some(value) => {
                        resolved += 1;
                        value.clone()
                    }
                    None => Value::Null,
                }
            }
        };
        args.insert(name.clone(), value);
    }
    (Value::Object(args), refs, resolved)
}

/// Deterministic mock for a step that cannot run for real.
fn mock_output(step: &CandidateStep) -> Value {
    if let Some(mock) = &step.mock {
        return mock.clone();
    }
    if let Some(schema) = &step.output_schema {
        return schema_default(schema);
    }
    json!({"_mocked": true, "tool": step.tool, "reason": "unsafe"})
}

/// Zero-value instance of a declared JSON schema.
fn schema_default(schema: &Value) -> Value {
    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut out = Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, prop) in props {
                    out.insert(name.clone(), schema_default(prop));
                }
            }
            Value::Object(out)
        }
        Some("array") => json!([]),
        Some("string") => json!(""),
        Some("integer") => json!(0),
        Some("number") => json!(0.0),
        Some("boolean") => json!(false),
        _ => Value::Null,
    }
}

/// Weighted, monotone confidence over the three signals, clamped to [0, 1].
fn confidence_score(real_ratio: f64, coherence: f64, historical: f64) -> f64 {
    let score = 0.5 * real_ratio.clamp(0.0, 1.0)
        + 0.3 * coherence.clamp(0.0, 1.0)
        + 0.2 * historical.clamp(0.0, 1.0);
    score.clamp(0.0, 1.0)
}
