//! Execution host: one isolated thread running exactly one proof operation.
//!
//! A host loads a fresh engine, runs the request, sends a single terminal
//! message and then sits defunct until the orchestrator releases it. Panics
//! raised by the engine are contained on the host thread and reported as
//! execution failures.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::backend::{EngineFactory, ProvingEngine};
use crate::core::{HashKind, JobId, Payload, ProofRequest, ProofValue};
use crate::{ProverError, ProverResult};

use super::protocol::{HostEnvelope, HostRequest, HostResponse};

/// Load an engine and run `request` on it.
pub fn execute(factory: &dyn EngineFactory, request: &HostRequest) -> HostResponse {
    let mut engine = match factory.load() {
        Ok(engine) => engine,
        Err(e) => return HostResponse::load_failure(e.message),
    };
    if let Err(e) = engine.initialize() {
        return HostResponse::load_failure(e.message);
    }
    debug!(engine = factory.name(), "engine initialized");

    match prove(engine.as_mut(), request) {
        Ok(value) => HostResponse::Success { value },
        Err(message) => HostResponse::execution_failure(message),
    }
}

fn prove(engine: &mut dyn ProvingEngine, request: &HostRequest) -> Result<ProofValue, String> {
    let value = match (request.kind, &request.payload) {
        (HashKind::Keccak, Payload::Batch(inputs)) => {
            ProofValue::Digests(engine.prove_and_verify_batch(inputs).map_err(|e| e.message)?)
        }
        (HashKind::Sha2, Payload::Single(input)) => {
            ProofValue::Digest(engine.prove_and_verify_single(input).map_err(|e| e.message)?)
        }
        (HashKind::Sha3, Payload::Single(input)) => ProofValue::Transcript(
            engine
                .prove_and_verify_with_transcript(input)
                .map_err(|e| e.message)?,
        ),
        (kind, _) => return Err(format!("payload does not match a {kind} request")),
    };
    Ok(value)
}

/// `execute` with engine panics turned into failure responses.
pub fn execute_contained(factory: &dyn EngineFactory, request: &HostRequest) -> HostResponse {
    match catch_unwind(AssertUnwindSafe(|| execute(factory, request))) {
        Ok(response) => response,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            warn!(%message, "engine panicked");
            HostResponse::execution_failure(format!("engine panicked: {message}"))
        }
    }
}

/// Handle to a running host, exclusively owned by the job that spawned it.
#[derive(Debug)]
pub struct ExecutionHost {
    job: JobId,
    handle: Option<JoinHandle<()>>,
}

impl ExecutionHost {
    /// Spawn the host thread. Returns as soon as the thread exists; the engine
    /// is loaded and run asynchronously.
    pub fn start(
        job: JobId,
        request: &ProofRequest,
        factory: Arc<dyn EngineFactory>,
        outbox: Sender<HostEnvelope>,
    ) -> ProverResult<Self> {
        let wire = HostRequest::from(request);
        let handle = std::thread::Builder::new()
            .name(format!("host-{}", job.0))
            .spawn(move || {
                let span = tracing::info_span!("host", job = %job, kind = %wire.kind);
                let _enter = span.enter();

                let response = execute_contained(factory.as_ref(), &wire);
                debug!(success = response.is_success(), "host finished");
                if outbox.send(HostEnvelope { job, response }).is_err() {
                    debug!("orchestrator gone, response dropped");
                }
            })
            .map_err(|e| ProverError::Communication(format!("failed to spawn host: {e}")))?;

        Ok(ExecutionHost {
            job,
            handle: Some(handle),
        })
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    /// True once the host thread has exited, with or without sending.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Release the host. A finished thread is joined; a busy one is detached
    /// and whatever it sends later is discarded by the orchestrator.
    pub fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!(job = %self.job, "detaching busy host");
            }
        }
    }
}
