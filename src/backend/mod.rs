//! Proving engine backends.
//!
//! The proving engine is an external capability: it computes a hash trace,
//! proves it and verifies the proof. This module defines the `ProvingEngine`
//! trait, the `EngineFactory` hosts load engines through, and two bindings:
//! a subprocess engine and a mock for tests and dry runs.

pub mod command;
pub mod mock;
pub mod traits;

// Re-export key types
pub use command::{CommandEngine, CommandEngineConfig};
pub use mock::{MockConfig, MockEngine, MockGate, MockStats, mock_digest};
pub use traits::{EngineError, EngineFactory, EngineResult, ProvingEngine};
