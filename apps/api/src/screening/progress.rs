//! Progress and failure notification capabilities.
//!
//! The orchestrator reports through these traits; the presentation layer decides
//! what to do with the signals (log them, stream them to a browser, ...).

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::screening::cancel::CancelToken;
use crate::screening::models::{BatchReport, DocumentFailure};

/// One progress tick: emitted once per finished document, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

pub trait ProgressSink: Send + Sync {
    fn progress(&self, update: Progress);
}

pub trait NotificationSink: Send + Sync {
    fn document_failed(&self, failure: &DocumentFailure);
}

/// Logs progress and failures via `tracing`. Used by the JSON endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, update: Progress) {
        info!(
            "Screening progress: {}/{} ({:.0}%)",
            update.completed,
            update.total,
            update.fraction() * 100.0
        );
    }
}

impl NotificationSink for TracingSink {
    fn document_failed(&self, failure: &DocumentFailure) {
        warn!(
            "Failed to screen {} ({:?} at {:?}): {}",
            failure.name, failure.kind, failure.stage, failure.message
        );
    }
}

/// Events pushed to streaming clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScreeningEvent {
    Started {
        run_id: Uuid,
        total: usize,
    },
    Progress {
        completed: usize,
        total: usize,
        fraction: f64,
    },
    Failure(DocumentFailure),
    Report(BatchReport),
}

impl ScreeningEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ScreeningEvent::Started { .. } => "started",
            ScreeningEvent::Progress { .. } => "progress",
            ScreeningEvent::Failure(_) => "failure",
            ScreeningEvent::Report(_) => "report",
        }
    }
}

/// Forwards signals into a channel. When the receiving side is gone (client
/// disconnected) the run is cancelled so no new documents are dispatched.
pub struct ChannelSink {
    tx: UnboundedSender<ScreeningEvent>,
    cancel: CancelToken,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ScreeningEvent>, cancel: CancelToken) -> Self {
        Self { tx, cancel }
    }

    fn send(&self, event: ScreeningEvent) {
        if self.tx.send(event).is_err() && !self.cancel.is_cancelled() {
            warn!("Screening event receiver dropped; cancelling remaining documents");
            self.cancel.cancel();
        }
    }
}

impl ProgressSink for ChannelSink {
    fn progress(&self, update: Progress) {
        self.send(ScreeningEvent::Progress {
            completed: update.completed,
            total: update.total,
            fraction: update.fraction(),
        });
    }
}

impl NotificationSink for ChannelSink {
    fn document_failed(&self, failure: &DocumentFailure) {
        self.send(ScreeningEvent::Failure(failure.clone()));
    }
}
