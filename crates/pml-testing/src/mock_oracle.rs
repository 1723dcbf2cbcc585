// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Mock capability oracle with canned answers.

use async_trait::async_trait;
use parking_lot::Mutex;
use pml::error::Result;
use pml::graph::TaskGraph;
use pml::oracle::{CandidatePath, CapabilityOracle, PredictedCall, WorkflowSummary};
use pml::task::{Task, TaskResult};
use serde_json::Value;
use std::collections::VecDeque;

/// Oracle returning pre-configured candidates, augmentations, and
/// predictions, with call accounting.
#[derive(Default)]
pub struct MockOracle {
    candidates: Mutex<Vec<CandidatePath>>,
    augmentations: Mutex<VecDeque<Vec<Task>>>,
    predictions: Mutex<Vec<PredictedCall>>,
    augment_calls: Mutex<Vec<String>>,
    prediction_calls: Mutex<usize>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_candidates(self, candidates: Vec<CandidatePath>) -> Self {
        *self.candidates.lock() = candidates;
        self
    }

    /// Queue the task set returned by the next `augment_dag` call. Each call
    /// consumes one entry; an empty queue means "no changes".
    #[must_use]
    pub fn with_augmentation(self, tasks: Vec<Task>) -> Self {
        self.augmentations.lock().push_back(tasks);
        self
    }

    #[must_use]
    pub fn with_predictions(self, predictions: Vec<PredictedCall>) -> Self {
        *self.predictions.lock() = predictions;
        self
    }

    /// Requirements passed to `augment_dag`, in call order.
    pub fn augment_requirements(&self) -> Vec<String> {
        self.augment_calls.lock().clone()
    }

    pub fn prediction_call_count(&self) -> usize {
        *self.prediction_calls.lock()
    }
}

#[async_trait]
impl CapabilityOracle for MockOracle {
    async fn find_candidates(&self, _intent: &str, _context: &Value) -> Result<Vec<CandidatePath>> {
        Ok(self.candidates.lock().clone())
    }

    async fn augment_dag(
        &self,
        _dag: &TaskGraph,
        _completed: &[TaskResult],
        new_requirement: &str,
        _context: &Value,
    ) -> Result<Vec<Task>> {
        self.augment_calls.lock().push(new_requirement.to_string());
        Ok(self.augmentations.lock().pop_front().unwrap_or_default())
    }

    async fn next_capabilities(&self, _summary: &WorkflowSummary) -> Result<Vec<PredictedCall>> {
        *self.prediction_calls.lock() += 1;
        Ok(self.predictions.lock().clone())
    }
}
