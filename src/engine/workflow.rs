//! Workflows driving requests through the orchestrator.
//!
//! A batch may hold requests that conflict with each other (two SHA jobs, or
//! two Keccak batches). The orchestrator rejects those while the earlier one
//! is active, so the batch workflow holds them back and re-submits once the
//! slot frees up. Requests for the same slot therefore run in file order;
//! requests for different slots overlap.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{EnvironmentInfo, JobId, JobRecord, JobStatus, ProofRequest, TimingStat};
use crate::{ProverError, ProverResult};

use super::orchestrator::Orchestrator;

/// Aggregate view over a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub engine: String,
    pub jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Per-job elapsed time over jobs that ran
    pub elapsed: TimingStat,
    /// Wall-clock time of the whole batch
    pub wall_ms: f64,
}

/// Records in request order plus the summary.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<JobRecord>,
    pub summary: BatchSummary,
}

/// Submit one request and wait for its terminal state.
pub fn prove_one(
    orchestrator: &mut Orchestrator,
    request: ProofRequest,
    env: &EnvironmentInfo,
) -> ProverResult<JobRecord> {
    let id = orchestrator.submit(request)?;
    orchestrator.wait(id)?;
    record_for(orchestrator, id, env)
}

/// Run every request to a terminal state.
///
/// Conflicting requests wait for their slot; any other submit error aborts
/// the batch before further requests are submitted.
pub fn run_batch(
    orchestrator: &mut Orchestrator,
    requests: &[ProofRequest],
    env: &EnvironmentInfo,
) -> ProverResult<BatchOutcome> {
    let wall_start = Instant::now();
    let mut ids: Vec<Option<JobId>> = vec![None; requests.len()];
    let mut waiting: VecDeque<usize> = (0..requests.len()).collect();

    while !waiting.is_empty() || orchestrator.has_active() {
        let mut held = VecDeque::with_capacity(waiting.len());
        while let Some(index) = waiting.pop_front() {
            match orchestrator.submit(requests[index].clone()) {
                Ok(id) => ids[index] = Some(id),
                Err(ProverError::AlreadyRunning { active, .. }) => {
                    debug!(request = index, %active, "slot busy, holding request");
                    held.push_back(index);
                }
                Err(e) => return Err(e),
            }
        }
        waiting = held;

        if orchestrator.has_active() {
            orchestrator.pump(orchestrator.config().poll_interval);
        }
    }

    let mut records = Vec::with_capacity(requests.len());
    for id in ids.into_iter().flatten() {
        records.push(record_for(orchestrator, id, env)?);
    }

    let summary = summarize(
        orchestrator.engine_info().name,
        &records,
        wall_start.elapsed().as_secs_f64() * 1000.0,
    );
    info!(
        jobs = summary.jobs,
        succeeded = summary.succeeded,
        failed = summary.failed,
        wall_ms = summary.wall_ms,
        "batch finished"
    );
    Ok(BatchOutcome { records, summary })
}

fn record_for(
    orchestrator: &Orchestrator,
    id: JobId,
    env: &EnvironmentInfo,
) -> ProverResult<JobRecord> {
    let job = orchestrator.job(id).ok_or(ProverError::UnknownJob(id))?;
    JobRecord::from_job(job, orchestrator.engine_info(), env.clone())
}

pub fn summarize(engine: String, records: &[JobRecord], wall_ms: f64) -> BatchSummary {
    let count = |status: JobStatus| records.iter().filter(|r| r.status == status).count();
    let samples: Vec<f64> = records.iter().filter_map(|r| r.elapsed_ms).collect();
    BatchSummary {
        engine,
        jobs: records.len(),
        succeeded: count(JobStatus::Succeeded),
        failed: count(JobStatus::Failed),
        cancelled: count(JobStatus::Cancelled),
        elapsed: TimingStat::from_samples(&samples),
        wall_ms,
    }
}
