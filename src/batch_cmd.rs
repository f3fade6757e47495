use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::config::load_batch_config;
use crate::core::{EnvironmentInfo, JobRecord};
use crate::engine::{BatchSummary, LoggingObserver, Orchestrator, run_batch};
use crate::prove_cmd::{append_records, print_record, write_json};
use crate::{ProverError, ProverResult};

#[derive(Debug, Serialize)]
struct SummaryReport<'a> {
    summary: &'a BatchSummary,
    records: &'a [JobRecord],
}

pub fn run(
    config_path: PathBuf,
    jsonl_out: Option<PathBuf>,
    csv_out: Option<PathBuf>,
    summary_out: Option<PathBuf>,
) -> ProverResult<()> {
    let cfg = load_batch_config(&config_path)?;
    info!(
        config = %config_path.display(),
        jobs = cfg.requests.len(),
        max_hosts = cfg.orchestrator.max_hosts,
        "loaded batch"
    );

    let mut orchestrator =
        Orchestrator::new(cfg.engine.build(), cfg.orchestrator).with_observer(LoggingObserver);
    let env = EnvironmentInfo::detect();
    let outcome = run_batch(&mut orchestrator, &cfg.requests, &env)?;

    append_records(jsonl_out.as_deref(), csv_out.as_deref(), &outcome.records)?;
    if let Some(path) = summary_out {
        write_json(
            &path,
            &SummaryReport {
                summary: &outcome.summary,
                records: &outcome.records,
            },
        )?;
    }

    for record in &outcome.records {
        print_record(record);
    }
    let summary = &outcome.summary;
    println!(
        "batch: engine={} jobs={} succeeded={} failed={} cancelled={} wall={:.1}ms",
        summary.engine,
        summary.jobs,
        summary.succeeded,
        summary.failed,
        summary.cancelled,
        summary.wall_ms
    );

    if summary.failed > 0 {
        return Err(ProverError::Message(format!(
            "{} of {} jobs failed",
            summary.failed, summary.jobs
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonlWriter;

    #[test]
    fn test_batch_with_failure_still_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("jobs.toml");
        std::fs::write(
            &config,
            r#"
[orchestrator]
timeout_secs = 30

[[job]]
kind = "keccak"
inputs = [1, 2, 3]

[[job]]
kind = "keccak"
inputs = ["x"]

[[job]]
kind = "sha2"
input = "aabb"
"#,
        )
        .unwrap();

        let jsonl = dir.path().join("history.jsonl");
        let summary = dir.path().join("summary.json");
        let err = run(config, Some(jsonl.clone()), None, Some(summary.clone())).unwrap_err();
        assert!(err.to_string().contains("1 of 3 jobs failed"));

        let records = JsonlWriter::new(&jsonl).read_all().unwrap();
        assert_eq!(records.len(), 3);

        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&summary).unwrap()).unwrap();
        assert_eq!(report["summary"]["succeeded"], 2);
        assert_eq!(report["records"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_config_file() {
        let err = run(PathBuf::from("/nonexistent/jobs.toml"), None, None, None).unwrap_err();
        assert!(matches!(err, ProverError::Config(_)));
    }
}
