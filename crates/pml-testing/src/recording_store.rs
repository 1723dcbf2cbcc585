// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Trace store that records instead of shipping to a learning backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use pml::error::Result;
use pml::feedback::{Trace, TraceStore};
use std::time::Duration;

/// In-memory trace sink with a small wait helper for fire-and-forget
/// publication tests.
#[derive(Default)]
pub struct RecordingTraceStore {
    traces: Mutex<Vec<Trace>>,
}

impl RecordingTraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<Trace> {
        self.traces.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.lock().is_empty()
    }

    /// Poll until at least `count` traces arrived or the timeout expires.
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TraceStore for RecordingTraceStore {
    async fn publish(&self, trace: Trace) -> Result<()> {
        self.traces.lock().push(trace);
        Ok(())
    }
}
