// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Execution event stream.
//!
//! The executor publishes [`ExecutionEvent`]s to any number of subscribers
//! over bounded channels. Backpressure policy: when a subscriber's buffer is
//! full, `state_updated` events are dropped first (and counted per
//! subscriber); task lifecycle and terminal events are never dropped, the
//! emitter waits instead. The stream closes exactly once, after
//! `workflow_complete` or on fatal abort.
//!
//! Events serialize with a `type` discriminator so a dashboard or test can
//! consume them straight off the wire:
//!
//! ```json
//! {"type":"task_complete","workflow_id":"wf-1","task_id":"read","execution_time_ms":12}
//! ```

use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::error::TaskError;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which loop a decision point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Agent-in-the-loop.
    Ail,
    /// Human-in-the-loop.
    Hil,
}

/// An event emitted during workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkflowStart {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        total_tasks: usize,
        total_layers: usize,
    },
    LayerStart {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        layer_index: usize,
        task_ids: Vec<TaskId>,
    },
    TaskStart {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        task_id: TaskId,
        /// Tool identifier for tool calls, absent for code tasks.
        #[serde(skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
    },
    TaskComplete {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        task_id: TaskId,
        execution_time_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_cache: Option<bool>,
    },
    /// A safe-to-fail task exhausted its retries; the workflow continues.
    TaskWarning {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        task_id: TaskId,
        message: String,
    },
    TaskError {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        task_id: TaskId,
        error: TaskError,
    },
    StateUpdated {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        layer_index: usize,
    },
    Checkpoint {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        checkpoint_id: String,
        layer_index: usize,
    },
    DecisionRequired {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        decision_type: DecisionKind,
        description: String,
    },
    WorkflowComplete {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        total_time_ms: u64,
        successful_tasks: usize,
        failed_tasks: usize,
    },
}

impl ExecutionEvent {
    /// Whether this event may be dropped under backpressure.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ExecutionEvent::StateUpdated { .. })
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            ExecutionEvent::WorkflowStart { workflow_id, .. }
            | ExecutionEvent::LayerStart { workflow_id, .. }
            | ExecutionEvent::TaskStart { workflow_id, .. }
            | ExecutionEvent::TaskComplete { workflow_id, .. }
            | ExecutionEvent::TaskWarning { workflow_id, .. }
            | ExecutionEvent::TaskError { workflow_id, .. }
            | ExecutionEvent::StateUpdated { workflow_id, .. }
            | ExecutionEvent::Checkpoint { workflow_id, .. }
            | ExecutionEvent::DecisionRequired { workflow_id, .. }
            | ExecutionEvent::WorkflowComplete { workflow_id, .. } => workflow_id,
        }
    }
}

struct Subscriber {
    tx: mpsc::Sender<ExecutionEvent>,
    dropped: Arc<AtomicU64>,
}

/// Fan-out publisher for execution events.
pub struct EventStream {
    subscribers: parking_lot::Mutex<Vec<Subscriber>>,
    capacity: usize,
    closed: AtomicBool,
}

impl EventStream {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a stream with a custom per-subscriber buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: parking_lot::Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a new subscriber. Subscribing after close yields a subscription
    /// that immediately reports end-of-stream.
    pub fn subscribe(&self) -> EventSubscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        if !self.closed.load(Ordering::Acquire) {
            self.subscribers.lock().push(Subscriber {
                tx,
                dropped: Arc::clone(&dropped),
            });
        }
        EventSubscription { rx, dropped }
    }

    /// Publish an event to every live subscriber.
    ///
    /// Lossy events are dropped (and counted) for subscribers whose buffer is
    /// full; all other events wait for buffer space. Emitting after close is
    /// a no-op.
    pub async fn emit(&self, event: ExecutionEvent) {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(workflow_id = %event.workflow_id(), "event emitted after stream close");
            return;
        }

        // Snapshot the senders so the lock is not held across await points.
        let targets: Vec<(mpsc::Sender<ExecutionEvent>, Arc<AtomicU64>)> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .map(|s| (s.tx.clone(), Arc::clone(&s.dropped)))
                .collect()
        };

        let mut disconnected = false;
        for (tx, dropped) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(ev)) => {
                    if ev.is_lossy() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    } else if tx.send(ev).await.is_err() {
                        disconnected = true;
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    disconnected = true;
                }
            }
        }

        if disconnected {
            self.subscribers.lock().retain(|s| !s.tx.is_closed());
        }
    }

    /// Close the stream. Idempotent; subscribers observe end-of-stream after
    /// draining their buffers.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscribers.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the event stream.
pub struct EventSubscription {
    rx: mpsc::Receiver<ExecutionEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSubscription {
    /// Receive the next event. `None` means the stream closed and the buffer
    /// is drained.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of lossy events dropped for this subscriber so far.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain the stream to completion, collecting every event.
    pub async fn collect(mut self) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}
