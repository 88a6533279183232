//! Live status feed.
//!
//! Workers describe what they are doing as typed events pushed through a
//! channel; a single renderer task turns them into log lines. Business
//! logic never blocks on, and never reads back from, the feed — publishing
//! to a closed channel is silently dropped during shutdown.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What one worker is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Between iterations.
    Idle,
    /// Mid-submission for the given attempt number.
    Processing { attempt: u64 },
    /// Free-text progress or warning line.
    Message(String),
}

/// One status update from one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub worker: String,
    pub status: WorkerStatus,
}

/// Sending half of the feed, cloned into every worker.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusFeed {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, worker: &str, status: WorkerStatus) {
        let _ = self.tx.send(StatusEvent {
            worker: worker.to_string(),
            status,
        });
    }

    pub fn processing(&self, worker: &str, attempt: u64) {
        self.publish(worker, WorkerStatus::Processing { attempt });
    }

    pub fn idle(&self, worker: &str) {
        self.publish(worker, WorkerStatus::Idle);
    }

    pub fn message(&self, worker: &str, text: impl Into<String>) {
        self.publish(worker, WorkerStatus::Message(text.into()));
    }
}

/// Single rendering consumer. Runs until every sender is dropped.
pub async fn run_renderer(mut rx: mpsc::UnboundedReceiver<StatusEvent>) {
    while let Some(event) = rx.recv().await {
        match event.status {
            WorkerStatus::Message(text) => info!(worker = %event.worker, "{text}"),
            WorkerStatus::Processing { attempt } => {
                debug!(worker = %event.worker, attempt, "Processing vote")
            }
            WorkerStatus::Idle => debug!(worker = %event.worker, "Idle"),
        }
    }
}
