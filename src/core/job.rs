//! Job records and their lifecycle.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::request::{HashKind, ProofRequest, ProofResult};
use crate::{ProverError, ProverResult};

/// Identifier handed out by the orchestrator, unique per orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Allowed edges of the job state machine. No state is ever revisited.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    EngineLoad,
    EngineExecution,
    Communication,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: HashKind,
    pub message: String,
    pub cause: FailureCause,
}

impl JobFailure {
    pub fn new(kind: HashKind, cause: FailureCause, message: impl Into<String>) -> Self {
        JobFailure {
            kind,
            message: message.into(),
            cause,
        }
    }

    pub fn timeout(kind: HashKind, after: Duration) -> Self {
        Self::new(
            kind,
            FailureCause::Timeout,
            format!("no response from host after {:.1}s", after.as_secs_f64()),
        )
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} job failed: {}", self.kind, self.message)
    }
}

/// Terminal outcome of a job. Exactly one per terminal job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded(ProofResult),
    Failed(JobFailure),
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded(_) => JobState::Succeeded,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// One submitted request tracked from submission to its terminal outcome.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    request: ProofRequest,
    state: JobState,
    submitted_at: String,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    outcome: Option<JobOutcome>,
}

impl Job {
    pub fn new(id: JobId, request: ProofRequest) -> Self {
        Job {
            id,
            request,
            state: JobState::Pending,
            submitted_at: crate::now_rfc3339(),
            started_at: None,
            ended_at: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &ProofRequest {
        &self.request
    }

    pub fn kind(&self) -> HashKind {
        self.request.kind()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// RFC 3339 wall-clock submission time.
    pub fn submitted_at(&self) -> &str {
        &self.submitted_at
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&ProofResult> {
        match &self.outcome {
            Some(JobOutcome::Succeeded(result)) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.outcome {
            Some(JobOutcome::Failed(failure)) => Some(failure),
            _ => None,
        }
    }

    /// Time between host spawn and terminal message. `None` until both are known.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Time spent running so far, or in total once terminal.
    pub fn running_for(&self, now: Instant) -> Option<Duration> {
        let start = self.started_at?;
        Some(self.ended_at.unwrap_or(now).saturating_duration_since(start))
    }

    fn transition(&mut self, next: JobState) -> ProverResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProverError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Pending -> Running. `started_at` is the instant just before the host spawn.
    pub fn mark_running(&mut self, started_at: Instant) -> ProverResult<()> {
        self.transition(JobState::Running)?;
        self.started_at = Some(started_at);
        Ok(())
    }

    /// Move to the terminal state matching `outcome`.
    pub fn finish(&mut self, outcome: JobOutcome, ended_at: Instant) -> ProverResult<()> {
        self.transition(outcome.state())?;
        if let Some(start) = self.started_at {
            self.ended_at = Some(ended_at.max(start));
        }
        self.outcome = Some(outcome);
        Ok(())
    }
}
