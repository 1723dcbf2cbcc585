// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Centralized defaults for the execution engine.
//!
//! Every tunable lives here so that behavior is discoverable in one place.
//! Per-run overrides go through the config structs ([`crate::executor::ExecutorConfig`],
//! [`crate::sandbox::SandboxConfig`], [`crate::speculation::SpeculationConfig`],
//! [`crate::exploration::ExplorationConfig`]); these constants are their defaults.

use std::time::Duration;

/// Default per-task deadline for tool invocations.
/// Generous enough for slow MCP servers while still detecting hangs.
pub const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(30);

/// Maximum automatic retry attempts for retryable task failures.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay of the exponential retry backoff.
/// Attempt n (1-based) waits `base * 2^(n-1)`: 100, 200, 400 ms.
pub const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Per-subscriber event channel capacity.
/// When a subscriber falls this far behind, lossy events start dropping.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default time-to-live for speculation cache entries.
pub const DEFAULT_SPECULATION_TTL: Duration = Duration::from_secs(300);

/// Maximum concurrent speculative pre-executions per engine.
pub const DEFAULT_MAX_CONCURRENT_SPECULATIONS: usize = 2;

/// Maximum concurrent exploratory path traversals per engine.
pub const DEFAULT_MAX_CONCURRENT_EXPLORATIONS: usize = 2;

/// Maximum number of steps walked down a single exploratory path.
pub const DEFAULT_MAX_EXPLORATION_DEPTH: usize = 5;

/// Wall-clock budget for a single exploratory path.
pub const DEFAULT_EXPLORATION_PATH_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum replans accepted for a single workflow.
pub const DEFAULT_MAX_REPLANS: u32 = 3;

/// Tasks of one layer executed concurrently.
pub const DEFAULT_MAX_PARALLEL_TASKS: usize = 8;

/// How long an agent-in-the-loop gate waits for a command before continuing.
pub const DEFAULT_AIL_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a human-in-the-loop gate waits for a response before aborting.
/// Humans are slow; aborting is the safe default when they never answer.
pub const DEFAULT_HIL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default wall-clock budget for a sandboxed code task.
pub const DEFAULT_SANDBOX_TIMEOUT: Duration = Duration::from_secs(30);

/// Default memory cap for a sandboxed code task, in bytes (512 MB).
pub const DEFAULT_SANDBOX_MEMORY_CAP_BYTES: u64 = 512 * 1024 * 1024;

/// Maximum accepted source size for a code task, in bytes (100 KB).
/// Enforced before dispatch; larger sources are rejected as validation errors.
pub const MAX_SANDBOX_SOURCE_BYTES: usize = 100 * 1024;

/// Byte limit applied to any single value entering workflow context or a
/// checkpoint snapshot. Larger values are truncated and marked.
pub const DEFAULT_CONTEXT_VALUE_LIMIT_BYTES: usize = 64 * 1024;

/// Recursion depth cap applied during sanitization.
pub const MAX_SANITIZE_DEPTH: usize = 32;

/// Replacement text for redacted secret material.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Key injected into truncated or depth-capped values.
pub const TRUNCATION_MARKER: &str = "_truncated";

/// Checkpoints retained per workflow by the default retention policy.
pub const DEFAULT_KEEP_CHECKPOINT_LAYERS: usize = 5;

/// Age after which finalized workflows are pruned from checkpoint stores.
pub const DEFAULT_FINALIZED_CHECKPOINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_schedule_matches_documented_delays() {
        let delays: Vec<u64> = (1..=MAX_RETRY_ATTEMPTS)
            .map(|attempt| RETRY_BACKOFF_BASE.as_millis() as u64 * (1 << (attempt - 1)))
            .collect();
        assert_eq!(delays, vec![100, 200, 400]);
    }

    #[test]
    fn sandbox_caps_are_nonzero() {
        assert!(DEFAULT_SANDBOX_MEMORY_CAP_BYTES > 0);
        assert!(MAX_SANDBOX_SOURCE_BYTES > 0);
    }
}
