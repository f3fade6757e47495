//! Batch file loading.
//!
//! A batch file is TOML with an optional `[orchestrator]` table, an optional
//! `[engine]` table and one `[[job]]` entry per request.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::{CommandEngine, CommandEngineConfig, EngineFactory, MockConfig, MockEngine};
use crate::core::{HashKind, Payload, ProofRequest};
use crate::engine::OrchestratorConfig;
use crate::{ProverError, ProverResult};

/// Which engine binding to load.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineConfig {
    Mock {
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        batch_len: Option<usize>,
    },
    Command {
        path: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Mock {
            delay_ms: 0,
            batch_len: None,
        }
    }
}

/// Engine selector for the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EngineChoice {
    #[default]
    Mock,
    Command,
}

impl EngineConfig {
    /// Build an engine config from command-line flags. `args` is split shell-style.
    pub fn from_cli(
        choice: EngineChoice,
        path: Option<PathBuf>,
        args: Option<&str>,
        timeout_secs: Option<u64>,
    ) -> ProverResult<Self> {
        match choice {
            EngineChoice::Mock => {
                if path.is_some() || args.is_some() {
                    return Err(ProverError::Config(
                        "--engine-path and --engine-args need --engine command".into(),
                    ));
                }
                Ok(EngineConfig::default())
            }
            EngineChoice::Command => {
                let args = match args {
                    Some(s) => shlex::split(s).ok_or_else(|| {
                        ProverError::Config(format!("cannot split --engine-args: {s}"))
                    })?,
                    None => Vec::new(),
                };
                Ok(EngineConfig::Command {
                    path: path.unwrap_or_else(|| CommandEngineConfig::default().program),
                    args,
                    timeout_secs,
                })
            }
        }
    }

    pub fn build(&self) -> Arc<dyn EngineFactory> {
        match self {
            EngineConfig::Mock {
                delay_ms,
                batch_len,
            } => {
                let mut config = MockConfig::default().with_delay(Duration::from_millis(*delay_ms));
                if let Some(len) = batch_len {
                    config = config.with_batch_len(*len);
                }
                Arc::new(MockEngine::new(config))
            }
            EngineConfig::Command {
                path,
                args,
                timeout_secs,
            } => {
                let mut config = CommandEngineConfig::new(path).with_args(args.clone());
                if let Some(secs) = timeout_secs {
                    config = config.with_timeout(Duration::from_secs(*secs));
                }
                Arc::new(CommandEngine::new(config))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawOrchestrator {
    timeout_secs: Option<u64>,
    max_hosts: Option<usize>,
    poll_ms: Option<u64>,
}

/// Keccak inputs may be written as TOML integers or strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(u64),
    Str(String),
}

impl RawValue {
    fn into_string(self) -> String {
        match self {
            RawValue::Int(v) => v.to_string(),
            RawValue::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawJob {
    kind: HashKind,
    #[serde(default)]
    inputs: Option<Vec<RawValue>>,
    #[serde(default)]
    input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(default)]
    orchestrator: RawOrchestrator,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(rename = "job", default)]
    jobs: Vec<RawJob>,
}

/// A parsed batch file.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub orchestrator: OrchestratorConfig,
    pub engine: EngineConfig,
    pub requests: Vec<ProofRequest>,
}

pub fn load_batch_config(path: &Path) -> ProverResult<BatchConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| ProverError::Config(format!("{}: {e}", path.display())))?;
    parse_batch_config(&s)
}

pub fn parse_batch_config(s: &str) -> ProverResult<BatchConfig> {
    let raw: RawBatch = toml::from_str(s).map_err(|e| ProverError::Config(e.to_string()))?;
    if raw.jobs.is_empty() {
        return Err(ProverError::Config("no [[job]] entries".into()));
    }

    let mut orchestrator = OrchestratorConfig::default();
    if let Some(secs) = raw.orchestrator.timeout_secs {
        orchestrator = orchestrator.with_timeout(Duration::from_secs(secs));
    }
    if let Some(max_hosts) = raw.orchestrator.max_hosts {
        orchestrator = orchestrator.with_max_hosts(max_hosts);
    }
    if let Some(ms) = raw.orchestrator.poll_ms {
        orchestrator = orchestrator.with_poll_interval(Duration::from_millis(ms));
    }

    let mut requests = Vec::with_capacity(raw.jobs.len());
    for (i, job) in raw.jobs.into_iter().enumerate() {
        let payload = match (job.inputs, job.input) {
            (Some(inputs), None) => {
                Payload::Batch(inputs.into_iter().map(RawValue::into_string).collect())
            }
            (None, Some(input)) => Payload::Single(input),
            (Some(_), Some(_)) => {
                return Err(ProverError::Config(format!(
                    "job {}: set either `inputs` or `input`, not both",
                    i + 1
                )));
            }
            (None, None) => {
                return Err(ProverError::Config(format!(
                    "job {}: missing `inputs` or `input`",
                    i + 1
                )));
            }
        };
        let request = ProofRequest::new(job.kind, payload)
            .map_err(|e| ProverError::Config(format!("job {}: {e}", i + 1)))?;
        requests.push(request);
    }

    Ok(BatchConfig {
        orchestrator,
        engine: raw.engine,
        requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let cfg = parse_batch_config(
            r#"
[orchestrator]
timeout_secs = 120
max_hosts = 2

[engine]
kind = "command"
path = "./binius-prover"
args = ["--threads", "4"]

[[job]]
kind = "keccak"
inputs = [1, "2", 3]

[[job]]
kind = "sha2"
input = "aabbcc"
"#,
        )
        .unwrap();

        assert_eq!(cfg.orchestrator.job_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.orchestrator.max_hosts, 2);
        assert!(matches!(cfg.engine, EngineConfig::Command { ref args, .. } if args.len() == 2));
        assert_eq!(cfg.requests.len(), 2);
        assert_eq!(
            cfg.requests[0].payload(),
            &Payload::Batch(vec!["1".into(), "2".into(), "3".into()])
        );
        assert_eq!(cfg.requests[1].kind(), HashKind::Sha2);
    }

    #[test]
    fn test_engine_defaults_to_mock() {
        let cfg = parse_batch_config("[[job]]\nkind = \"sha3\"\ninput = \"\"\n").unwrap();
        assert!(matches!(cfg.engine, EngineConfig::Mock { .. }));
        assert_eq!(cfg.engine.build().name(), "mock");
    }

    #[test]
    fn test_engine_from_cli() {
        let engine = EngineConfig::from_cli(
            EngineChoice::Command,
            Some(PathBuf::from("/opt/prover")),
            Some("--threads 4 --label 'two words'"),
            None,
        )
        .unwrap();
        match engine {
            EngineConfig::Command { path, args, .. } => {
                assert_eq!(path, PathBuf::from("/opt/prover"));
                assert_eq!(args, vec!["--threads", "4", "--label", "two words"]);
            }
            other => panic!("unexpected engine config: {other:?}"),
        }

        let engine = EngineConfig::from_cli(EngineChoice::Command, None, None, None).unwrap();
        assert!(matches!(engine, EngineConfig::Command { ref path, .. } if path == Path::new("binius-prover")));

        let err = EngineConfig::from_cli(EngineChoice::Mock, Some("x".into()), None, None);
        assert!(matches!(err, Err(ProverError::Config(_))));
    }

    #[test]
    fn test_no_jobs_is_an_error() {
        let err = parse_batch_config("[orchestrator]\nmax_hosts = 1\n").unwrap_err();
        assert!(matches!(err, ProverError::Config(_)));
    }

    #[test]
    fn test_wrong_payload_for_kind() {
        let err = parse_batch_config("[[job]]\nkind = \"sha2\"\ninputs = [\"1\"]\n").unwrap_err();
        assert!(err.to_string().contains("job 1"));

        let err = parse_batch_config("[[job]]\nkind = \"keccak\"\n").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
