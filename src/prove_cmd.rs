use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::{EngineChoice, EngineConfig};
use crate::core::{EnvironmentInfo, HashKind, JobRecord, JobStatus, Payload, ProofRequest};
use crate::engine::{LoggingObserver, Orchestrator, OrchestratorConfig, prove_one};
use crate::storage::{CsvJobLog, JsonlWriter};
use crate::{ProverError, ProverResult};

/// Options for a single `prove` invocation.
#[derive(Debug, Clone, Default)]
pub struct ProveOptions {
    pub kind: Option<HashKind>,
    pub input: Option<String>,
    pub inputs: Vec<String>,
    pub engine: EngineChoice,
    pub engine_path: Option<PathBuf>,
    pub engine_args: Option<String>,
    /// Seconds; zero waits forever
    pub timeout: u64,
    pub json: Option<PathBuf>,
    pub jsonl: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

impl ProveOptions {
    fn request(&self) -> ProverResult<ProofRequest> {
        let kind = self
            .kind
            .ok_or_else(|| ProverError::Config("--kind is required".into()))?;
        let payload = match (&self.input, self.inputs.is_empty()) {
            (Some(input), true) => Payload::Single(input.clone()),
            (None, false) => Payload::Batch(self.inputs.clone()),
            (Some(_), false) => {
                return Err(ProverError::Config(
                    "pass either --input or --inputs, not both".into(),
                ));
            }
            (None, true) => {
                return Err(ProverError::Config("missing --input or --inputs".into()));
            }
        };
        ProofRequest::new(kind, payload)
    }
}

pub fn run(opts: ProveOptions) -> ProverResult<()> {
    let request = opts.request()?;
    let timeout = Duration::from_secs(opts.timeout);
    // The engine process gets the same budget as the job itself.
    let engine_timeout = (opts.timeout > 0).then_some(opts.timeout);
    let engine = EngineConfig::from_cli(
        opts.engine,
        opts.engine_path.clone(),
        opts.engine_args.as_deref(),
        engine_timeout,
    )?;

    let mut orchestrator = Orchestrator::new(
        engine.build(),
        OrchestratorConfig::default().with_timeout(timeout),
    )
    .with_observer(LoggingObserver);
    let env = EnvironmentInfo::detect();

    info!(kind = %request.kind(), inputs = request.payload().len(), "proving");
    let record = prove_one(&mut orchestrator, request, &env)?;

    if let Some(json) = &opts.json {
        write_json(json, &record)?;
    }
    append_records(
        opts.jsonl.as_deref(),
        opts.csv.as_deref(),
        std::slice::from_ref(&record),
    )?;

    print_record(&record);
    match record.failure {
        Some(failure) if record.status == JobStatus::Failed => Err(failure.into()),
        _ => Ok(()),
    }
}

pub(crate) fn print_record(record: &JobRecord) {
    let elapsed = record
        .elapsed_ms
        .map(|ms| format!("{ms:.1}ms"))
        .unwrap_or_else(|| "-".into());
    match record.status {
        JobStatus::Succeeded => {
            println!(
                "prove: {} kind={} engine={} time={} digests={} pending={}",
                record.job_id,
                record.kind,
                record.engine.name,
                elapsed,
                record.digests.len(),
                record.pending_slots
            );
            for digest in &record.digests {
                println!("  {}", if digest.is_empty() { "<pending>" } else { digest });
            }
        }
        JobStatus::Failed => {
            let message = record
                .failure
                .as_ref()
                .map(|f| f.message.as_str())
                .unwrap_or_default();
            println!(
                "prove: {} kind={} engine={} time={} failed: {}",
                record.job_id, record.kind, record.engine.name, elapsed, message
            );
        }
        JobStatus::Cancelled => {
            println!("prove: {} kind={} cancelled", record.job_id, record.kind);
        }
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> ProverResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| ProverError::Message(e.to_string()))?;
        }
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| ProverError::Message(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| ProverError::Message(e.to_string()))
}

pub(crate) fn append_records(
    jsonl: Option<&Path>,
    csv: Option<&Path>,
    records: &[JobRecord],
) -> ProverResult<()> {
    if let Some(path) = jsonl {
        JsonlWriter::new(path).append_all(records)?;
    }
    if let Some(path) = csv {
        CsvJobLog::new(path).append(records)?;
    }
    Ok(())
}
