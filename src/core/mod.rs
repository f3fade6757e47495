//! Core types and schemas for trace-prover.
//!
//! Requests, jobs and their lifecycle live here, together with the
//! versioned `JobRecord` schema used for every persisted output.

pub mod env;
pub mod job;
pub mod request;
pub mod schema;

// Re-export key types for convenience
pub use env::EnvironmentInfo;
pub use job::{FailureCause, Job, JobFailure, JobId, JobOutcome, JobState};
pub use request::{
    HashKind, Payload, ProofRequest, ProofResult, ProofValue, ResultSlot, SlotStatus,
    TranscriptOutput,
};
pub use schema::{EngineInfo, JobRecord, JobStatus, SCHEMA_VERSION, TimingStat};
