//! Subprocess engine: drives an external prover executable.
//!
//! Every proof call spawns `<program> <args...> prove`, writes one JSON
//! `HostRequest` to its stdin and reads one JSON `HostResponse` from its
//! stdout. The child is killed if it outlives the configured timeout.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::{HashKind, Payload, ProofValue, TranscriptOutput};
use crate::engine::protocol::{HostRequest, HostResponse};

use super::traits::{EngineError, EngineFactory, EngineResult, ProvingEngine};

/// Configuration for the subprocess engine.
#[derive(Debug, Clone)]
pub struct CommandEngineConfig {
    /// Path to the engine executable
    pub program: PathBuf,
    /// Extra arguments placed before the `prove` subcommand
    pub args: Vec<String>,
    /// Kill the child after this long. Zero waits forever.
    pub timeout: Duration,
}

impl Default for CommandEngineConfig {
    fn default() -> Self {
        CommandEngineConfig {
            program: PathBuf::from("binius-prover"),
            args: Vec::new(),
            timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }
}

impl CommandEngineConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandEngineConfig {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Factory for subprocess-backed engines.
pub struct CommandEngine {
    config: CommandEngineConfig,
    version_cache: OnceLock<Option<String>>,
}

impl CommandEngine {
    pub fn new(config: CommandEngineConfig) -> Self {
        CommandEngine {
            config,
            version_cache: OnceLock::new(),
        }
    }

    pub fn from_path(program: impl Into<PathBuf>) -> Self {
        Self::new(CommandEngineConfig::new(program))
    }

    pub fn config(&self) -> &CommandEngineConfig {
        &self.config
    }
}

fn detect_version(program: &Path) -> EngineResult<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| EngineError::new(format!("failed to start {}: {e}", program.display())))?;
    if !output.status.success() {
        return Err(EngineError::new(format!(
            "{} --version failed: status={}",
            program.display(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl EngineFactory for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    fn version(&self) -> Option<String> {
        self.version_cache
            .get_or_init(|| {
                detect_version(&self.config.program)
                    .ok()
                    .filter(|s| !s.is_empty())
            })
            .clone()
    }

    fn load(&self) -> EngineResult<Box<dyn ProvingEngine>> {
        Ok(Box::new(CommandEngineInstance {
            config: self.config.clone(),
            ready: false,
        }))
    }
}

struct CommandEngineInstance {
    config: CommandEngineConfig,
    ready: bool,
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

impl CommandEngineInstance {
    fn wait_with_timeout(&self, child: &mut Child) -> EngineResult<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| EngineError::new(e.to_string()))?
            {
                return Ok(status);
            }

            if !self.config.timeout.is_zero() && start.elapsed() >= self.config.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::new("engine process timed out"));
            }

            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn run(&self, request: HostRequest) -> EngineResult<ProofValue> {
        if !self.ready {
            return Err(EngineError::new("engine used before initialize"));
        }
        let body = serde_json::to_vec(&request)
            .map_err(|e| EngineError::new(format!("failed to encode request: {e}")))?;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("prove")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            EngineError::new(format!(
                "failed to spawn {}: {e}",
                self.config.program.display()
            ))
        })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        // Fed from its own thread so a child that never reads cannot stall the
        // timeout guard. Dropping the pipe at the end signals EOF.
        let feeder = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                let _ = stdin.write_all(&body);
            })
        });

        let status = self.wait_with_timeout(&mut child)?;
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        debug!(
            kind = %request.kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            %status,
            "engine process exited"
        );

        if !status.success() {
            return Err(EngineError::new(format!(
                "engine process failed: status={status} stderr={}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let response: HostResponse = serde_json::from_slice(&stdout).map_err(|e| {
            EngineError::new(format!("failed to parse engine output: {e}"))
        })?;
        match response {
            HostResponse::Success { value } => Ok(value),
            HostResponse::Failure { error, .. } => Err(EngineError::new(error)),
        }
    }
}

fn unexpected(kind: HashKind) -> EngineError {
    EngineError::new(format!("engine returned the wrong result shape for {kind}"))
}

impl ProvingEngine for CommandEngineInstance {
    fn initialize(&mut self) -> EngineResult<()> {
        detect_version(&self.config.program)?;
        self.ready = true;
        Ok(())
    }

    fn prove_and_verify_batch(&mut self, inputs: &[String]) -> EngineResult<Vec<String>> {
        let request = HostRequest {
            kind: HashKind::Keccak,
            payload: Payload::Batch(inputs.to_vec()),
        };
        match self.run(request)? {
            ProofValue::Digests(digests) => Ok(digests),
            _ => Err(unexpected(HashKind::Keccak)),
        }
    }

    fn prove_and_verify_single(&mut self, input: &str) -> EngineResult<String> {
        let request = HostRequest {
            kind: HashKind::Sha2,
            payload: Payload::Single(input.to_string()),
        };
        match self.run(request)? {
            ProofValue::Digest(digest) => Ok(digest),
            _ => Err(unexpected(HashKind::Sha2)),
        }
    }

    fn prove_and_verify_with_transcript(&mut self, input: &str) -> EngineResult<TranscriptOutput> {
        let request = HostRequest {
            kind: HashKind::Sha3,
            payload: Payload::Single(input.to_string()),
        };
        match self.run(request)? {
            ProofValue::Transcript(output) => Ok(output),
            _ => Err(unexpected(HashKind::Sha3)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CommandEngineConfig::default();
        assert_eq!(config.program, PathBuf::from("binius-prover"));
        assert!(config.args.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = CommandEngineConfig::new("/usr/local/bin/prover")
            .with_args(vec!["--threads".into(), "4".into()])
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.program, PathBuf::from("/usr/local/bin/prover"));
        assert_eq!(config.args, vec!["--threads", "4"]);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_program_is_a_load_error() {
        let factory = CommandEngine::from_path("/nonexistent/trace-prover-engine");
        assert_eq!(factory.name(), "command");
        assert!(factory.version().is_none());

        let mut engine = factory.load().unwrap();
        let err = engine.initialize().unwrap_err();
        assert!(err.message.starts_with("failed to start"));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_fires_when_child_ignores_stdin() {
        // Larger than a pipe buffer, so a blocking write would never return.
        let input = "a".repeat(1 << 20);
        let config = CommandEngineConfig::new("bash")
            .with_args(vec!["-c".into(), "sleep 10".into()])
            .with_timeout(Duration::from_millis(300));
        let mut engine = CommandEngine::new(config).load().unwrap();
        engine.initialize().unwrap();

        let start = Instant::now();
        let err = engine.prove_and_verify_single(&input).unwrap_err();
        assert_eq!(err.message, "engine process timed out");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_uninitialized_instance_refuses_work() {
        let mut engine = CommandEngine::from_path("true").load().unwrap();
        assert!(engine.prove_and_verify_single("aa").is_err());
    }
}
