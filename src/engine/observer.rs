//! Terminal-outcome notifications delivered by the orchestrator.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::{JobFailure, JobId, ProofResult};

/// Receives exactly one notification per job that reaches a terminal state.
pub trait JobObserver {
    fn on_result(&mut self, id: JobId, result: &ProofResult, elapsed: Duration);

    /// `elapsed` is absent only if the host never started.
    fn on_failure(&mut self, id: JobId, failure: &JobFailure, elapsed: Option<Duration>);

    fn on_cancelled(&mut self, _id: JobId) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn on_result(&mut self, _id: JobId, _result: &ProofResult, _elapsed: Duration) {}

    fn on_failure(&mut self, _id: JobId, _failure: &JobFailure, _elapsed: Option<Duration>) {}
}

/// Observer that reports outcomes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl JobObserver for LoggingObserver {
    fn on_result(&mut self, id: JobId, result: &ProofResult, elapsed: Duration) {
        info!(
            job = %id,
            kind = %result.kind,
            digests = result.digests().len(),
            complete = result.is_complete(),
            elapsed_ms = elapsed.as_millis() as u64,
            "proof verified"
        );
    }

    fn on_failure(&mut self, id: JobId, failure: &JobFailure, elapsed: Option<Duration>) {
        warn!(
            job = %id,
            kind = %failure.kind,
            cause = ?failure.cause,
            elapsed_ms = elapsed.map(|d| d.as_millis() as u64),
            "{}",
            failure.message
        );
    }

    fn on_cancelled(&mut self, id: JobId) {
        info!(job = %id, "cancelled");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Result {
        id: JobId,
        result: ProofResult,
        elapsed: Duration,
    },
    Failure {
        id: JobId,
        failure: JobFailure,
        elapsed: Option<Duration>,
    },
    Cancelled {
        id: JobId,
    },
}

impl Notification {
    pub fn id(&self) -> JobId {
        match self {
            Notification::Result { id, .. }
            | Notification::Failure { id, .. }
            | Notification::Cancelled { id } => *id,
        }
    }
}

/// Collects notifications; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn for_job(&self, id: JobId) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.id() == id)
            .collect()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut log) = self.log.lock() {
            log.push(notification);
        }
    }
}

impl JobObserver for RecordingObserver {
    fn on_result(&mut self, id: JobId, result: &ProofResult, elapsed: Duration) {
        self.push(Notification::Result {
            id,
            result: result.clone(),
            elapsed,
        });
    }

    fn on_failure(&mut self, id: JobId, failure: &JobFailure, elapsed: Option<Duration>) {
        self.push(Notification::Failure {
            id,
            failure: failure.clone(),
            elapsed,
        });
    }

    fn on_cancelled(&mut self, id: JobId) {
        self.push(Notification::Cancelled { id });
    }
}
