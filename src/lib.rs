pub mod backend;
pub mod batch_cmd;
pub mod config;
pub mod core;
pub mod engine;
pub mod prove_cmd;
pub mod storage;

use thiserror::Error;

use crate::core::{FailureCause, HashKind, JobFailure, JobId, JobState, ResultSlot};

#[derive(Debug, Error)]
pub enum ProverError {
    /// The proving engine could not be loaded or initialized.
    #[error("engine load failed: {0}")]
    EngineLoad(String),
    /// The engine rejected or faulted on an input. Carried verbatim.
    #[error("{0}")]
    EngineExecution(String),
    /// The host went away before sending its terminal message.
    #[error("host communication failed: {0}")]
    Communication(String),
    /// The host gave no answer within the job timeout.
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("a {kind} job ({active}) is already running for the {slot} slot")]
    AlreadyRunning {
        kind: HashKind,
        slot: ResultSlot,
        active: JobId,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
    #[error("config: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type ProverResult<T> = Result<T, ProverError>;

impl From<JobFailure> for ProverError {
    fn from(failure: JobFailure) -> Self {
        match failure.cause {
            FailureCause::EngineLoad => ProverError::EngineLoad(failure.message),
            FailureCause::EngineExecution => ProverError::EngineExecution(failure.message),
            FailureCause::Timeout => ProverError::Timeout(failure.message),
            FailureCause::Communication => ProverError::Communication(failure.message),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha256::digest;
    digest(bytes)
}

/// Current UTC time as RFC 3339, empty on formatting failure.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
