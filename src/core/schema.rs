//! JobRecord schema v1 - canonical schema for all persisted job outputs.

use serde::{Deserialize, Serialize};

use super::env::EnvironmentInfo;
use super::job::{Job, JobFailure, JobId, JobOutcome};
use super::request::HashKind;
use crate::{ProverError, ProverResult};

/// Schema version for forward compatibility
pub const SCHEMA_VERSION: u32 = 1;

/// Elapsed-time summary over a set of jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingStat {
    pub count: u32,
    pub mean_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_ms: Option<f64>,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimingStat {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return TimingStat {
                count: 0,
                mean_ms: 0.0,
                median_ms: None,
                min_ms: 0.0,
                max_ms: 0.0,
            };
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let median_ms = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        TimingStat {
            count: n as u32,
            mean_ms: sorted.iter().sum::<f64>() / n as f64,
            median_ms: Some(median_ms),
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
        }
    }
}

/// Engine information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Terminal status as written to records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Canonical job record, one per terminal job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub schema_version: u32,

    /// Unique identifier for this record
    pub record_id: String,

    /// RFC 3339 submission timestamp
    pub timestamp: String,

    pub job_id: JobId,

    pub kind: HashKind,

    pub status: JobStatus,

    pub engine: EngineInfo,

    pub env: EnvironmentInfo,

    /// Number of inputs in the request
    pub input_count: usize,

    /// SHA-256 of the serialized payload
    pub inputs_sha256: String,

    /// Host spawn to terminal message, absent for jobs cancelled before running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,

    /// Digests in input order, empty strings for slots that did not complete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digests: Vec<String>,

    #[serde(default)]
    pub pending_slots: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice_len: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
}

impl JobRecord {
    /// Build a record from a terminal job.
    pub fn from_job(job: &Job, engine: EngineInfo, env: EnvironmentInfo) -> ProverResult<Self> {
        let outcome = job.outcome().ok_or_else(|| {
            ProverError::Message(format!("{} is {} and has no outcome yet", job.id(), job.state()))
        })?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let record_id = format!("{:x}-{}", nanos, job.id().0);

        let mut record = JobRecord {
            schema_version: SCHEMA_VERSION,
            record_id,
            timestamp: job.submitted_at().to_string(),
            job_id: job.id(),
            kind: job.kind(),
            status: JobStatus::Cancelled,
            engine,
            env,
            input_count: job.request().payload().len(),
            inputs_sha256: job.request().fingerprint(),
            elapsed_ms: job.elapsed().map(|d| d.as_secs_f64() * 1000.0),
            digests: Vec::new(),
            pending_slots: 0,
            transcript_len: None,
            advice_len: None,
            failure: None,
        };

        match outcome {
            JobOutcome::Succeeded(result) => {
                record.status = JobStatus::Succeeded;
                record.digests = result.digests().into_iter().map(str::to_string).collect();
                record.pending_slots = record.digests.iter().filter(|d| d.is_empty()).count();
                if let Some((transcript, advice)) = result.auxiliary() {
                    record.transcript_len = Some(transcript.len());
                    record.advice_len = Some(advice.len());
                }
            }
            JobOutcome::Failed(failure) => {
                record.status = JobStatus::Failed;
                record.failure = Some(failure.clone());
            }
            JobOutcome::Cancelled => {}
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::{ProofRequest, ProofResult, ProofValue};
    use std::time::{Duration, Instant};

    fn engine() -> EngineInfo {
        EngineInfo {
            name: "mock".into(),
            version: None,
        }
    }

    #[test]
    fn test_timing_stat_from_samples() {
        let stat = TimingStat::from_samples(&[100.0, 120.0, 110.0]);
        assert_eq!(stat.count, 3);
        assert!((stat.mean_ms - 110.0).abs() < 0.001);
        assert_eq!(stat.median_ms, Some(110.0));
        assert_eq!(stat.min_ms, 100.0);
        assert_eq!(stat.max_ms, 120.0);
    }

    #[test]
    fn test_timing_stat_empty_samples() {
        let stat = TimingStat::from_samples(&[]);
        assert_eq!(stat.count, 0);
        assert!(stat.median_ms.is_none());
    }

    #[test]
    fn test_record_requires_terminal_job() {
        let job = Job::new(JobId(3), ProofRequest::sha2("ab").unwrap());
        assert!(JobRecord::from_job(&job, engine(), EnvironmentInfo::default()).is_err());
    }

    #[test]
    fn test_record_counts_pending_slots() {
        let mut job = Job::new(JobId(4), ProofRequest::keccak(["1", "2"]).unwrap());
        let start = Instant::now();
        job.mark_running(start).unwrap();
        let result = ProofResult::new(
            HashKind::Keccak,
            ProofValue::Digests(vec!["aa".into(), String::new()]),
        );
        job.finish(
            JobOutcome::Succeeded(result),
            start + Duration::from_millis(5),
        )
        .unwrap();

        let record = JobRecord::from_job(&job, engine(), EnvironmentInfo::default()).unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert_eq!(record.input_count, 2);
        assert_eq!(record.digests.len(), 2);
        assert_eq!(record.pending_slots, 1);
        assert!(record.elapsed_ms.unwrap() >= 5.0);
        assert!(record.failure.is_none());
    }
}
