// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Speculative pre-execution: the fingerprint cache and the speculator.
//!
//! At a layer boundary the engine may pre-execute upcoming tasks whose
//! arguments already resolve and whose tools the safety oracle clears. The
//! results land in a [`SpeculationCache`] keyed by a fingerprint over the
//! tool id and canonical resolved arguments; when the task actually runs
//! with identical arguments, the cached output is served with
//! `from_cache = true`.
//!
//! Invariants:
//! - Only speculative runs populate the cache; real executions never do.
//! - A candidate that fails `can_speculate` is skipped; there is no bypass.
//! - The cache is shared across workflows and internally synchronized.

use crate::canonical::{canonicalize, content_hash};
use crate::constants::{DEFAULT_MAX_CONCURRENT_SPECULATIONS, DEFAULT_SPECULATION_TTL};
use crate::invoker::ToolInvoker;
use crate::oracle::{CapabilityOracle, WorkflowSummary};
use crate::resolver::{resolve_arguments, resolve_spec_map};
use crate::safety::SafetyOracle;
use crate::state::WorkflowState;
use crate::task::Task;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Cache key over a tool (or capability) id and its resolved arguments.
///
/// Canonical JSON makes the key insensitive to argument key order and
/// whitespace; any semantic difference in arguments is a different key.
pub fn fingerprint(id: &str, resolved_args: &Value) -> String {
    content_hash(&json!([id, canonicalize(resolved_args)]))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    output: Value,
    computed_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.computed_at.elapsed() < self.ttl
    }
}

/// Hit/miss accounting for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Shared, TTL-bound store of speculatively computed outputs.
pub struct SpeculationCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SpeculationCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SPECULATION_TTL)
    }

    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a fingerprint. Expired entries are evicted on access and
    /// count as misses.
    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        match self.entries.get_mut(fingerprint) {
            Some(mut entry) if entry.is_fresh() => {
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.output.clone())
            }
            Some(entry) => {
                drop(entry);
                self.entries.remove(fingerprint);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Freshness probe that skips the hit/miss accounting. Used by the
    /// speculator to avoid re-running work it already cached.
    pub fn contains_fresh(&self, fingerprint: &str) -> bool {
        self.entries
            .get(fingerprint)
            .map(|e| e.is_fresh())
            .unwrap_or(false)
    }

    /// Store a speculative result under the default TTL.
    pub fn put(&self, fingerprint: String, output: Value) {
        self.put_with_ttl(fingerprint, output, self.default_ttl);
    }

    pub fn put_with_ttl(&self, fingerprint: String, output: Value, ttl: Duration) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                output,
                computed_at: Instant::now(),
                ttl,
                hit_count: 0,
            },
        );
    }

    /// Drop every expired entry. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh());
        before - self.entries.len()
    }

    /// Times a specific entry has been served.
    pub fn hit_count(&self, fingerprint: &str) -> u64 {
        self.entries
            .get(fingerprint)
            .map(|e| e.hit_count)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SpeculationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Speculation tuning knobs.
#[derive(Debug, Clone)]
pub struct SpeculationConfig {
    /// Concurrent speculative invocations per engine.
    pub max_concurrent: usize,
}

impl Default for SpeculationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_SPECULATIONS,
        }
    }
}

/// Pre-executes upcoming safe tasks and predicted next calls.
#[derive(Clone)]
pub struct SpeculativeExecutor {
    invoker: Arc<ToolInvoker>,
    cache: Arc<SpeculationCache>,
    safety: SafetyOracle,
    permits: Arc<Semaphore>,
}

impl SpeculativeExecutor {
    pub fn new(
        invoker: Arc<ToolInvoker>,
        cache: Arc<SpeculationCache>,
        safety: SafetyOracle,
        config: SpeculationConfig,
    ) -> Self {
        Self {
            invoker,
            cache,
            safety,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        }
    }

    pub fn cache(&self) -> &Arc<SpeculationCache> {
        &self.cache
    }

    /// Pre-execute every eligible task of an upcoming layer. Returns the
    /// number of results cached. Failures are logged and discarded; a failed
    /// speculation simply means no cache hit later.
    pub async fn speculate_layer(&self, tasks: Vec<Task>, state: WorkflowState) -> usize {
        let mut jobs = Vec::new();
        for task in tasks {
            let Some(tool) = task.tool().map(str::to_string) else {
                continue; // code tasks are never speculated
            };
            if !self.safety.can_speculate(&tool, task.side_effects) {
                tracing::debug!(task_id = %task.id, %tool, "speculation skipped by safety oracle");
                continue;
            }
            let args = match resolve_arguments(&task, &state, &self.safety) {
                Ok(args) => args,
                Err(unresolvable) => {
                    tracing::debug!(task_id = %task.id, %unresolvable, "speculation skipped");
                    continue;
                }
            };
            jobs.push((task.id.clone(), tool, args));
        }

        let mut cached = 0;
        let results = futures::future::join_all(
            jobs.into_iter()
                .map(|(task_id, tool, args)| self.speculate_one(task_id, tool, args)),
        )
        .await;
        for did_cache in results {
            if did_cache {
                cached += 1;
            }
        }
        cached
    }

    /// Speculate the oracle's predicted next calls after completion. Returns
    /// the number of results cached.
    pub async fn predict_next(
        &self,
        oracle: &dyn CapabilityOracle,
        state: &WorkflowState,
        executed_tools: Vec<String>,
    ) -> usize {
        let summary = WorkflowSummary::from_state(state, executed_tools);
        let predictions = match oracle.next_capabilities(&summary).await {
            Ok(predictions) => predictions,
            Err(e) => {
                tracing::debug!(error = %e, "next-capability prediction failed");
                return 0;
            }
        };

        let mut jobs = Vec::new();
        for call in predictions {
            if !self.safety.can_speculate(&call.tool, false) {
                continue;
            }
            match resolve_spec_map(&call.arguments, state) {
                Ok(args) => jobs.push((
                    format!("predict:{}", call.tool),
                    call.tool,
                    Value::Object(args),
                )),
                Err(unresolvable) => {
                    tracing::debug!(tool = %call.tool, %unresolvable, "prediction skipped");
                }
            }
        }

        let results = futures::future::join_all(
            jobs.into_iter()
                .map(|(label, tool, args)| self.speculate_one(label, tool, args)),
        )
        .await;
        results.into_iter().filter(|cached| *cached).count()
    }

    async fn speculate_one(&self, label: String, tool: String, args: Value) -> bool {
        let key = fingerprint(&tool, &args);
        if self.cache.contains_fresh(&key) {
            return false;
        }

        // Closed semaphore is unreachable; treat it as a skipped speculation.
        let Ok(_permit) = self.permits.acquire().await else {
            return false;
        };

        match self.invoker.call_raw(&tool, &args).await {
            Ok(output) => {
                tracing::debug!(%label, %tool, "speculated result cached");
                self.cache.put(key, output);
                true
            }
            Err(e) => {
                tracing::debug!(%label, %tool, error = %e, "speculation attempt failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::invoker::ToolTransport;
    use crate::safety::{StaticPermissions, ToolPermissions};
    use crate::sanitize::Sanitizer;
    use crate::state::{reduce, StateUpdate};
    use crate::task::{ArgSpec, TaskResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[test]
    fn fingerprint_ignores_key_order_and_whitespace() {
        let a: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "a" : 1 , "b" : 2 }"#).unwrap();
        assert_eq!(fingerprint("fs:read_file", &a), fingerprint("fs:read_file", &b));
    }

    #[test]
    fn fingerprint_distinguishes_tool_and_args() {
        let args = json!({"path": "/a"});
        assert_ne!(
            fingerprint("fs:read_file", &args),
            fingerprint("fs:stat", &args)
        );
        assert_ne!(
            fingerprint("fs:read_file", &args),
            fingerprint("fs:read_file", &json!({"path": "/b"}))
        );
    }

    #[test]
    fn cache_hit_and_miss_accounting() {
        let cache = SpeculationCache::new();
        let key = fingerprint("t", &json!({}));

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), json!("out"));
        assert_eq!(cache.get(&key), Some(json!("out")));
        assert_eq!(cache.get(&key), Some(json!("out")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(cache.hit_count(&key), 2);
    }

    #[test]
    fn expired_entries_are_misses_and_evicted() {
        let cache = SpeculationCache::new();
        let key = fingerprint("t", &json!({}));
        cache.put_with_ttl(key.clone(), json!("out"), Duration::from_millis(0));

        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evict_expired_sweeps_only_stale_entries() {
        let cache = SpeculationCache::new();
        cache.put_with_ttl("stale".into(), json!(1), Duration::from_millis(0));
        cache.put("fresh".into(), json!(2));

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    /// Transport that records calls and returns a configured value.
    struct CountingTransport {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CountingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ToolTransport for CountingTransport {
        async fn call(&self, tool: &str, _args: &Value, _deadline: Duration) -> Result<Value> {
            self.calls.lock().push(tool.to_string());
            if self.fail {
                Err(Error::Transport("down".into()))
            } else {
                Ok(json!({"tool": tool}))
            }
        }
    }

    fn safety() -> SafetyOracle {
        SafetyOracle::new(Arc::new(
            StaticPermissions::new()
                .with_tool("fs:read_file", ToolPermissions::read_only_auto())
                .with_tool("github:push", ToolPermissions::hil_gated()),
        ))
    }

    fn executor_with(transport: Arc<CountingTransport>) -> SpeculativeExecutor {
        let safety = safety();
        SpeculativeExecutor::new(
            Arc::new(ToolInvoker::new(transport, safety.clone())),
            Arc::new(SpeculationCache::new()),
            safety,
            SpeculationConfig::default(),
        )
    }

    fn state() -> WorkflowState {
        WorkflowState::new("wf", BTreeMap::new(), &Sanitizer::new())
    }

    #[tokio::test]
    async fn speculates_safe_resolvable_tasks() {
        let transport = CountingTransport::new();
        let executor = executor_with(transport.clone());

        let task =
            Task::tool_call("read", "fs:read_file").with_arg("path", ArgSpec::literal(json!("/a")));
        let cached = executor.speculate_layer(vec![task], state()).await;

        assert_eq!(cached, 1);
        assert_eq!(transport.call_count(), 1);
        let key = fingerprint("fs:read_file", &json!({"path": "/a"}));
        assert!(executor.cache().contains_fresh(&key));
    }

    #[tokio::test]
    async fn never_speculates_unsafe_tools_or_side_effects() {
        let transport = CountingTransport::new();
        let executor = executor_with(transport.clone());

        let hil = Task::tool_call("push", "github:push").with_arg("b", ArgSpec::literal(json!(1)));
        let side_effects = Task::tool_call("read", "fs:read_file")
            .with_arg("path", ArgSpec::literal(json!("/a")))
            .with_side_effects();
        let code = Task::code_exec("calc", "return 1");

        let cached = executor
            .speculate_layer(vec![hil, side_effects, code], state())
            .await;

        assert_eq!(cached, 0);
        assert_eq!(transport.call_count(), 0);
        assert!(executor.cache().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_arguments_skip_the_candidate() {
        let transport = CountingTransport::new();
        let executor = executor_with(transport.clone());

        let task = Task::tool_call("read", "fs:read_file")
            .with_arg("path", ArgSpec::reference("upstream", "path"))
            .depends_on(["upstream"]);
        let cached = executor.speculate_layer(vec![task], state()).await;

        assert_eq!(cached, 0);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_speculation_leaves_no_cache_entry() {
        let transport = CountingTransport::failing();
        let executor = executor_with(transport.clone());

        let task =
            Task::tool_call("read", "fs:read_file").with_arg("path", ArgSpec::literal(json!("/a")));
        let cached = executor.speculate_layer(vec![task], state()).await;

        assert_eq!(cached, 0);
        assert_eq!(transport.call_count(), 1);
        assert!(executor.cache().is_empty());
    }

    #[tokio::test]
    async fn already_cached_fingerprints_are_not_rerun() {
        let transport = CountingTransport::new();
        let executor = executor_with(transport.clone());

        let task =
            Task::tool_call("read", "fs:read_file").with_arg("path", ArgSpec::literal(json!("/a")));
        executor.speculate_layer(vec![task.clone()], state()).await;
        executor.speculate_layer(vec![task], state()).await;

        assert_eq!(transport.call_count(), 1);
    }
}
