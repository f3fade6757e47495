//! Proving engine capability and the factory hosts load it through.

use thiserror::Error;

use crate::core::{HashKind, TranscriptOutput};

/// Error raised by a proving engine. The message is opaque to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        EngineError {
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// External proving engine: computes a hash trace, proves it, and verifies
/// the proof before returning the digest.
///
/// An engine value is owned by exactly one host and dropped with it. Nothing
/// is assumed about re-entrancy, so instances are never shared or reused.
pub trait ProvingEngine {
    /// Load parameters and circuitry. Called once, before any proof call.
    fn initialize(&mut self) -> EngineResult<()>;

    /// Batched Keccak workflow: one hex digest per input, in input order.
    fn prove_and_verify_batch(&mut self, inputs: &[String]) -> EngineResult<Vec<String>>;

    /// SHA-2 workflow.
    fn prove_and_verify_single(&mut self, input: &str) -> EngineResult<String>;

    /// SHA-3 workflow; transcript and advice are passed through unexamined.
    fn prove_and_verify_with_transcript(&mut self, input: &str) -> EngineResult<TranscriptOutput>;
}

/// Builds a fresh engine for every host.
///
/// Shared across host threads, hence `Send + Sync`. The engines it builds are
/// not: each lives and dies on its host's thread.
pub trait EngineFactory: Send + Sync {
    /// Engine name (e.g., "command", "mock").
    fn name(&self) -> &str;

    /// Engine version, if available.
    fn version(&self) -> Option<String> {
        None
    }

    /// Whether the engine implements the workflow for `kind`.
    fn supports(&self, _kind: HashKind) -> bool {
        true
    }

    /// Construct an engine value. Errors here count as load failures.
    fn load(&self) -> EngineResult<Box<dyn ProvingEngine>>;
}
