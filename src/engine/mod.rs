//! Engine module: runs proof requests in isolated hosts.
//!
//! # Architecture
//!
//! - **Protocol**: the plain-data request/response pair crossing the host
//!   boundary. Nothing else crosses it.
//!
//! - **Host**: one thread per job that loads a fresh engine from an
//!   `EngineFactory` (see `crate::backend`), runs one proof, sends one
//!   terminal message.
//!
//! - **Orchestrator**: owns the job table, enforces the slot conflict policy,
//!   times each job and notifies a `JobObserver` exactly once per job.
//!
//! The `workflow` submodule drives single requests and batches through the
//! orchestrator and turns finished jobs into `JobRecord`s.

pub mod host;
pub mod observer;
pub mod orchestrator;
pub mod protocol;
pub mod workflow;

// Re-export key types for convenience
pub use host::ExecutionHost;
pub use observer::{JobObserver, LoggingObserver, NoopObserver, Notification, RecordingObserver};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use protocol::{FailureStage, HostRequest, HostResponse};
pub use workflow::{BatchOutcome, BatchSummary, prove_one, run_batch};
