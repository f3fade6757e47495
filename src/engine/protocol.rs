//! Messages crossing the boundary between the orchestrator and a host.
//!
//! Both sides exchange plain values; nothing is shared. The same shapes are
//! the JSON wire format of `CommandEngine`, so a host living in another
//! process speaks exactly what an in-process host speaks.

use serde::{Deserialize, Serialize};

use crate::ProverResult;
use crate::core::{FailureCause, HashKind, JobId, Payload, ProofRequest, ProofValue};

/// Work order for a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRequest {
    pub kind: HashKind,
    pub payload: Payload,
}

impl HostRequest {
    /// Re-validate a request received over the wire.
    pub fn into_request(self) -> ProverResult<ProofRequest> {
        ProofRequest::new(self.kind, self.payload)
    }
}

impl From<&ProofRequest> for HostRequest {
    fn from(request: &ProofRequest) -> Self {
        HostRequest {
            kind: request.kind(),
            payload: request.payload().clone(),
        }
    }
}

/// Where inside the host a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Load,
    #[default]
    Execution,
}

impl From<FailureStage> for FailureCause {
    fn from(stage: FailureStage) -> Self {
        match stage {
            FailureStage::Load => FailureCause::EngineLoad,
            FailureStage::Execution => FailureCause::EngineExecution,
        }
    }
}

/// Terminal message of a host: a result or an error, never both, never neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostResponse {
    Success {
        value: ProofValue,
    },
    Failure {
        error: String,
        #[serde(default)]
        stage: FailureStage,
    },
}

impl HostResponse {
    pub fn load_failure(error: impl Into<String>) -> Self {
        HostResponse::Failure {
            error: error.into(),
            stage: FailureStage::Load,
        }
    }

    pub fn execution_failure(error: impl Into<String>) -> Self {
        HostResponse::Failure {
            error: error.into(),
            stage: FailureStage::Execution,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HostResponse::Success { .. })
    }
}

/// A response tagged with the job whose host sent it.
#[derive(Debug, Clone)]
pub struct HostEnvelope {
    pub job: JobId,
    pub response: HostResponse,
}

/// Check that a success value has the shape `request` calls for.
///
/// Batched results must hold one digest per input. Anything else is reported
/// as an execution failure of the engine.
pub fn check_value(request: &ProofRequest, value: &ProofValue) -> Result<(), String> {
    match (request.payload(), value) {
        (Payload::Batch(inputs), ProofValue::Digests(digests)) => {
            if inputs.len() == digests.len() {
                Ok(())
            } else {
                Err(format!(
                    "engine returned {} digests for {} inputs",
                    digests.len(),
                    inputs.len()
                ))
            }
        }
        (Payload::Single(_), ProofValue::Digest(_)) if request.kind() == HashKind::Sha2 => Ok(()),
        (Payload::Single(_), ProofValue::Transcript(_)) if request.kind() == HashKind::Sha3 => {
            Ok(())
        }
        _ => Err(format!(
            "engine returned a result of the wrong shape for a {} request",
            request.kind()
        )),
    }
}
