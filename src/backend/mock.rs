//! Mock engine for testing and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::core::{HashKind, TranscriptOutput};

use super::traits::{EngineError, EngineFactory, EngineResult, ProvingEngine};

/// Blocks mock hosts until opened. Lets tests hold a job in `Running`.
#[derive(Debug, Clone, Default)]
pub struct MockGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl MockGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut open) = lock.lock() {
            *open = true;
            cvar.notify_all();
        }
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let Ok(mut open) = lock.lock() else { return };
        while !*open {
            open = match cvar.wait(open) {
                Ok(guard) => guard,
                Err(_) => return,
            };
        }
    }
}

/// Counters shared by every engine a `MockEngine` builds.
#[derive(Debug, Default)]
pub struct MockStats {
    loads: AtomicUsize,
    proofs: AtomicUsize,
}

impl MockStats {
    /// Number of engine values constructed (one per host).
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of prove calls that reached the engine.
    pub fn proofs(&self) -> usize {
        self.proofs.load(Ordering::SeqCst)
    }
}

/// Configuration for mock engine behaviour.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Version to report
    pub version: Option<String>,
    /// Kinds the engine accepts
    pub kinds: Vec<HashKind>,
    /// Fail `initialize` with this message
    pub load_error: Option<String>,
    /// Fail every proof call with this message
    pub exec_error: Option<String>,
    /// Panic inside the proof call with this message
    pub panic_message: Option<String>,
    /// Sleep before answering
    pub delay: Duration,
    /// Required batch length; other lengths are rejected like a fixed-width circuit would
    pub batch_len: Option<usize>,
    /// Batch positions returned as empty digests
    pub blank_slots: Vec<usize>,
    /// Drop the last digest of a batch
    pub truncate_batch: bool,
    /// Hold every proof call until the gate opens
    pub gate: Option<MockGate>,
}

impl MockConfig {
    /// Create a new mock config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            version: Some("mock-1.0.0".to_string()),
            kinds: vec![HashKind::Keccak, HashKind::Sha2, HashKind::Sha3],
            load_error: None,
            exec_error: None,
            panic_message: None,
            delay: Duration::ZERO,
            batch_len: None,
            blank_slots: Vec::new(),
            truncate_batch: false,
            gate: None,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<HashKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn load_fails(mut self, message: impl Into<String>) -> Self {
        self.load_error = Some(message.into());
        self
    }

    pub fn exec_fails(mut self, message: impl Into<String>) -> Self {
        self.exec_error = Some(message.into());
        self
    }

    pub fn panics(mut self, message: impl Into<String>) -> Self {
        self.panic_message = Some(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never answer within any reasonable timeout.
    pub fn hangs(self) -> Self {
        self.with_delay(Duration::from_secs(3600))
    }

    pub fn with_batch_len(mut self, len: usize) -> Self {
        self.batch_len = Some(len);
        self
    }

    pub fn with_blank_slots(mut self, slots: Vec<usize>) -> Self {
        self.blank_slots = slots;
        self
    }

    pub fn truncate_batch(mut self) -> Self {
        self.truncate_batch = true;
        self
    }

    pub fn with_gate(mut self, gate: MockGate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self::new("mock")
    }
}

/// Deterministic fake digest for `input` under `kind`.
pub fn mock_digest(kind: HashKind, input: &str) -> String {
    crate::sha256_hex(format!("{kind}:{input}").as_bytes())
}

/// Mock engine factory.
///
/// Returns configurable fake results without any real proving. Digests are
/// SHA-256 of `"<kind>:<input>"`, so tests can predict them.
pub struct MockEngine {
    config: MockConfig,
    stats: Arc<MockStats>,
}

impl MockEngine {
    pub fn new(config: MockConfig) -> Self {
        MockEngine {
            config,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn default_mock() -> Self {
        Self::new(MockConfig::default())
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl EngineFactory for MockEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> Option<String> {
        self.config.version.clone()
    }

    fn supports(&self, kind: HashKind) -> bool {
        self.config.kinds.contains(&kind)
    }

    fn load(&self) -> EngineResult<Box<dyn ProvingEngine>> {
        self.stats.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngineInstance {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            initialized: false,
        }))
    }
}

struct MockEngineInstance {
    config: MockConfig,
    stats: Arc<MockStats>,
    initialized: bool,
}

impl MockEngineInstance {
    fn enter(&mut self) -> EngineResult<()> {
        if !self.initialized {
            return Err(EngineError::new("engine used before initialize"));
        }
        self.stats.proofs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.config.gate {
            gate.wait();
        }
        if !self.config.delay.is_zero() {
            std::thread::sleep(self.config.delay);
        }
        if let Some(message) = &self.config.panic_message {
            panic!("{message}");
        }
        if let Some(message) = &self.config.exec_error {
            return Err(EngineError::new(message.clone()));
        }
        Ok(())
    }
}

impl ProvingEngine for MockEngineInstance {
    fn initialize(&mut self) -> EngineResult<()> {
        if let Some(message) = &self.config.load_error {
            return Err(EngineError::new(message.clone()));
        }
        self.initialized = true;
        Ok(())
    }

    fn prove_and_verify_batch(&mut self, inputs: &[String]) -> EngineResult<Vec<String>> {
        self.enter()?;
        if let Some(len) = self.config.batch_len {
            if inputs.len() != len {
                return Err(EngineError::new(format!(
                    "Input must have exactly {len} elements."
                )));
            }
        }
        for input in inputs {
            input.trim().parse::<u64>().map_err(|e| {
                EngineError::new(format!("Failed to parse input value {e}"))
            })?;
        }

        let mut digests: Vec<String> = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                if self.config.blank_slots.contains(&i) {
                    String::new()
                } else {
                    mock_digest(HashKind::Keccak, input.trim())
                }
            })
            .collect();
        if self.config.truncate_batch {
            digests.pop();
        }
        Ok(digests)
    }

    fn prove_and_verify_single(&mut self, input: &str) -> EngineResult<String> {
        self.enter()?;
        Ok(mock_digest(HashKind::Sha2, input))
    }

    fn prove_and_verify_with_transcript(&mut self, input: &str) -> EngineResult<TranscriptOutput> {
        self.enter()?;
        let digest = mock_digest(HashKind::Sha3, input);
        Ok(TranscriptOutput {
            transcript: crate::sha256_hex(format!("transcript:{digest}").as_bytes()),
            advice: crate::sha256_hex(format!("advice:{digest}").as_bytes()),
            digest,
        })
    }
}
