// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! External control command ingress.
//!
//! Callers steer a running workflow by sending [`Command`]s through a
//! [`CommandSender`]. The executor consumes them from the paired
//! [`CommandQueue`] at exactly two kinds of windows: non-blocking drains at
//! layer boundaries and bounded waits at decision points. Commands that
//! arrive between windows stay buffered in FIFO order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

/// A control command injected into a running workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Proceed past the current decision point.
    Continue,
    /// Stop the workflow, cancelling in-flight work.
    Abort { reason: String },
    /// Answer to a `decision_required` event.
    ApprovalResponse {
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    /// Ask the capability oracle to augment the DAG with a new requirement.
    ReplanDag {
        new_requirement: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        available_context: Option<Value>,
    },
}

/// Cloneable handle for injecting commands.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Send a command. Returns `false` when the workflow has already
    /// terminated and the queue is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.send(Command::Abort {
            reason: reason.into(),
        })
    }

    pub fn approve(&self) -> bool {
        self.send(Command::ApprovalResponse {
            approved: true,
            feedback: None,
        })
    }

    pub fn deny(&self, feedback: impl Into<String>) -> bool {
        self.send(Command::ApprovalResponse {
            approved: false,
            feedback: Some(feedback.into()),
        })
    }

    pub fn replan(&self, new_requirement: impl Into<String>) -> bool {
        self.send(Command::ReplanDag {
            new_requirement: new_requirement.into(),
            available_context: None,
        })
    }
}

/// Executor-side end of the command channel.
pub struct CommandQueue {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandQueue {
    /// Create a queue and its paired sender.
    pub fn channel() -> (CommandSender, CommandQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CommandSender { tx }, CommandQueue { rx })
    }

    /// Non-blocking drain of everything currently buffered, in arrival order.
    pub fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Pop a single buffered command without waiting.
    pub fn try_next(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next command. `None` on timeout or if
    /// every sender is gone.
    pub async fn next_within(&mut self, timeout: Duration) -> Option<Command> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}
